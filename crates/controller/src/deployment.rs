//! Derived deployment readiness of interior sites.
//!
//! Deployment state is never stored as an independent fact; it is a pure
//! function of a site's lifecycle, its access points and its upstream
//! topology. Triggers re-run the derivation inside the caller's transaction
//! for exactly the sites a change can affect — one topology hop, never a
//! whole-graph walk — and skip the write when nothing changed.

use tracing::debug;

use vanlink_primitives::ids::SiteId;
use vanlink_primitives::site::{DeploymentState, SiteLifecycle};
use vanlink_store::{LinkRecord, Transaction};

/// The derivation itself.
///
/// `has_deployed_upstream` means at least one link this site connects out
/// through terminates at a `deployed` listener, so the site can be rolled
/// out automatically; with only a manage ingress it still can be deployed,
/// but needs bootstrapping by hand.
#[must_use]
pub const fn derive(
    lifecycle: SiteLifecycle,
    has_manage_access: bool,
    has_deployed_upstream: bool,
) -> DeploymentState {
    match lifecycle {
        SiteLifecycle::Active => DeploymentState::Deployed,
        SiteLifecycle::Ready if has_deployed_upstream => DeploymentState::ReadyAutomatic,
        SiteLifecycle::Ready if has_manage_access => DeploymentState::ReadyBootstrap,
        _ => DeploymentState::NotReady,
    }
}

/// Re-derives one site's deployment state, writing only on change.
///
/// Returns whether a write happened.
pub fn evaluate(txn: &mut Transaction<'_>, site: &SiteId) -> eyre::Result<bool> {
    let Some(mut record) = txn.site(site)? else {
        return Ok(false);
    };

    let has_manage_access = txn.manage_access_point_of(site)?.is_some();
    let has_deployed_upstream = txn.links_connecting_from(site)?.iter().try_fold(
        false,
        |found, link| -> eyre::Result<bool> {
            if found {
                return Ok(true);
            }
            Ok(txn
                .site(&link.listening)?
                .is_some_and(|listener| listener.deployment == DeploymentState::Deployed))
        },
    )?;

    let derived = derive(record.lifecycle, has_manage_access, has_deployed_upstream);
    if derived == record.deployment {
        return Ok(false);
    }

    debug!(%site, from = ?record.deployment, to = ?derived, "Deployment state changed");
    record.deployment = derived;
    txn.put_site(record)?;
    Ok(true)
}

/// A site's lifecycle reached `active`: re-evaluate it and the connecting
/// side of every link that listens at it. One hop only — a neighbor moving
/// to `ready-automatic` does not change what *its* downstreams derive, since
/// only `deployed` listeners count.
pub fn site_became_active(txn: &mut Transaction<'_>, site: &SiteId) -> eyre::Result<()> {
    let _changed = evaluate(txn, site)?;

    for link in txn.links_listening_at(site)? {
        let _changed = evaluate(txn, &link.connecting)?;
    }

    Ok(())
}

/// A topology edge was added or removed. Only the connecting side can be
/// affected, and only when the listening side is already `deployed`.
pub fn link_changed(txn: &mut Transaction<'_>, link: &LinkRecord) -> eyre::Result<()> {
    let listening_deployed = txn
        .site(&link.listening)?
        .is_some_and(|listener| listener.deployment == DeploymentState::Deployed);

    if listening_deployed {
        let _changed = evaluate(txn, &link.connecting)?;
    }

    Ok(())
}

/// A manage access point appeared on a site. Can only lift `not-ready` to
/// `ready-bootstrap`; any other current state is unaffected.
pub fn manage_ingress_added(txn: &mut Transaction<'_>, site: &SiteId) -> eyre::Result<()> {
    let current = txn.site(site)?.map(|record| record.deployment);
    if current == Some(DeploymentState::NotReady) {
        let _changed = evaluate(txn, site)?;
    }
    Ok(())
}

/// A site's manage access point went away. Can only drop `ready-bootstrap`
/// back to `not-ready`.
pub fn manage_ingress_deleted(txn: &mut Transaction<'_>, site: &SiteId) -> eyre::Result<()> {
    let current = txn.site(site)?.map(|record| record.deployment);
    if current == Some(DeploymentState::ReadyBootstrap) {
        let _changed = evaluate(txn, site)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vanlink_primitives::site::{AccessPointKind, AccessPointLifecycle};
    use vanlink_store::{AccessPointRecord, RecordStore, SiteRecord};

    use super::*;

    #[test]
    fn derivation_table_is_exhaustive() {
        use DeploymentState::{Deployed, NotReady, ReadyAutomatic, ReadyBootstrap};

        let lifecycles = [
            SiteLifecycle::Partial,
            SiteLifecycle::New,
            SiteLifecycle::Ready,
            SiteLifecycle::Active,
            SiteLifecycle::Expired,
            SiteLifecycle::Failed,
        ];

        for lifecycle in lifecycles {
            for has_manage in [false, true] {
                for has_upstream in [false, true] {
                    let derived = derive(lifecycle, has_manage, has_upstream);
                    let expected = match lifecycle {
                        SiteLifecycle::Active => Deployed,
                        SiteLifecycle::Ready if has_upstream => ReadyAutomatic,
                        SiteLifecycle::Ready if has_manage => ReadyBootstrap,
                        _ => NotReady,
                    };
                    assert_eq!(derived, expected, "{lifecycle:?}/{has_manage}/{has_upstream}");
                }
            }
        }
    }

    fn seeded(sites: &[(&str, SiteLifecycle, DeploymentState)]) -> RecordStore {
        let store = RecordStore::new();
        let mut txn = store.begin();
        for (id, lifecycle, deployment) in sites {
            let mut record =
                SiteRecord::interior(id.parse().unwrap(), *id, "bb".parse().unwrap());
            record.lifecycle = *lifecycle;
            record.deployment = *deployment;
            txn.put_site(record).unwrap();
        }
        txn.commit().unwrap();
        store
    }

    fn add_manage(store: &RecordStore, site: &str) {
        let mut txn = store.begin();
        txn.put_access_point(AccessPointRecord {
            id: format!("{site}-manage").parse().unwrap(),
            site: site.parse().unwrap(),
            kind: AccessPointKind::Manage,
            lifecycle: AccessPointLifecycle::Ready,
            bound: None,
            bound_hash: None,
        })
        .unwrap();
        txn.commit().unwrap();
    }

    fn link(store: &RecordStore, id: &str, listening: &str, connecting: &str) -> LinkRecord {
        let record = LinkRecord {
            id: id.parse().unwrap(),
            listening: listening.parse().unwrap(),
            connecting: connecting.parse().unwrap(),
            cost: 1,
        };
        let mut txn = store.begin();
        txn.put_link(record.clone()).unwrap();
        txn.commit().unwrap();
        record
    }

    fn deployment_of(store: &RecordStore, site: &str) -> DeploymentState {
        store
            .begin()
            .site(&site.parse().unwrap())
            .unwrap()
            .unwrap()
            .deployment
    }

    #[test]
    fn unchanged_derivation_writes_nothing() {
        let store = seeded(&[("s1", SiteLifecycle::New, DeploymentState::NotReady)]);
        let mut txn = store.begin();

        assert!(!evaluate(&mut txn, &"s1".parse().unwrap()).unwrap());
    }

    #[test]
    fn activation_cascades_exactly_one_hop() {
        // chain: c connects to b connects to a; a becomes active
        let store = seeded(&[
            ("a", SiteLifecycle::Active, DeploymentState::NotReady),
            ("b", SiteLifecycle::Ready, DeploymentState::NotReady),
            ("c", SiteLifecycle::Ready, DeploymentState::NotReady),
        ]);
        let _link = link(&store, "l-ab", "a", "b");
        let _link = link(&store, "l-bc", "b", "c");

        let mut txn = store.begin();
        site_became_active(&mut txn, &"a".parse().unwrap()).unwrap();
        txn.commit().unwrap();

        assert_eq!(deployment_of(&store, "a"), DeploymentState::Deployed);
        assert_eq!(deployment_of(&store, "b"), DeploymentState::ReadyAutomatic);
        // c's listener is merely ready-automatic, not deployed: untouched
        assert_eq!(deployment_of(&store, "c"), DeploymentState::NotReady);
    }

    #[test]
    fn link_to_a_deployed_listener_promotes_the_connecting_side() {
        let store = seeded(&[
            ("a", SiteLifecycle::Active, DeploymentState::Deployed),
            ("b", SiteLifecycle::Ready, DeploymentState::NotReady),
        ]);
        let record = link(&store, "l-ab", "a", "b");

        let mut txn = store.begin();
        link_changed(&mut txn, &record).unwrap();
        txn.commit().unwrap();

        assert_eq!(deployment_of(&store, "b"), DeploymentState::ReadyAutomatic);
    }

    #[test]
    fn link_removal_demotes_the_connecting_side() {
        let store = seeded(&[
            ("a", SiteLifecycle::Active, DeploymentState::Deployed),
            ("b", SiteLifecycle::Ready, DeploymentState::ReadyAutomatic),
        ]);
        let record = link(&store, "l-ab", "a", "b");

        let mut txn = store.begin();
        txn.delete_link(&record.id).unwrap();
        link_changed(&mut txn, &record).unwrap();
        txn.commit().unwrap();

        assert_eq!(deployment_of(&store, "b"), DeploymentState::NotReady);
    }

    #[test]
    fn link_change_is_ignored_when_listener_is_not_deployed() {
        let store = seeded(&[
            ("a", SiteLifecycle::Ready, DeploymentState::ReadyBootstrap),
            ("b", SiteLifecycle::Ready, DeploymentState::NotReady),
        ]);
        add_manage(&store, "b");
        let record = link(&store, "l-ab", "a", "b");

        let mut txn = store.begin();
        link_changed(&mut txn, &record).unwrap();
        txn.commit().unwrap();

        // would derive ready-bootstrap, but the trigger does not fire
        assert_eq!(deployment_of(&store, "b"), DeploymentState::NotReady);
    }

    #[test]
    fn manage_ingress_lifts_not_ready_only() {
        let store = seeded(&[("s1", SiteLifecycle::Ready, DeploymentState::NotReady)]);
        add_manage(&store, "s1");

        let mut txn = store.begin();
        manage_ingress_added(&mut txn, &"s1".parse().unwrap()).unwrap();
        txn.commit().unwrap();
        assert_eq!(deployment_of(&store, "s1"), DeploymentState::ReadyBootstrap);

        // the reverse trigger only fires from ready-bootstrap
        let mut txn = store.begin();
        let site = "s1".parse().unwrap();
        let access_point = txn.manage_access_point_of(&site).unwrap().unwrap();
        txn.delete_access_point(&access_point.id).unwrap();
        manage_ingress_deleted(&mut txn, &site).unwrap();
        txn.commit().unwrap();
        assert_eq!(deployment_of(&store, "s1"), DeploymentState::NotReady);
    }
}
