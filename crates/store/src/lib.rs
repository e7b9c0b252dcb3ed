//! The durable record store behind the vanlink control plane.
//!
//! This crate models the relational store as an abstract, transactional
//! record store: typed tables plus a shadow-write [`Transaction`] layer that
//! commits atomically or rolls back on drop. Production deployments put a
//! real database behind this interface; the in-memory implementation here
//! carries the exact semantics the synchronization core depends on —
//! begin/commit/rollback, and serialized transactions so invitation
//! `instance_count` increments are race-free under concurrent claims.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use vanlink_primitives::ids::{AccessPointId, InvitationId, LinkId, SiteId};
use vanlink_primitives::state::StateKey;

pub mod records;
mod transaction;

pub use records::{
    AccessPointRecord, CertificateRecord, InvitationRecord, LinkRecord, MemberSiteRecord,
    SiteRecord,
};
pub use transaction::Transaction;

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) sites: BTreeMap<SiteId, SiteRecord>,
    pub(crate) access_points: BTreeMap<AccessPointId, AccessPointRecord>,
    pub(crate) links: BTreeMap<LinkId, LinkRecord>,
    pub(crate) invitations: BTreeMap<InvitationId, InvitationRecord>,
    pub(crate) members: BTreeMap<SiteId, MemberSiteRecord>,
    pub(crate) certificates: BTreeMap<(SiteId, StateKey), CertificateRecord>,
}

/// Handle to the record store; cheap to clone, shared across tasks.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    tables: Arc<Mutex<Tables>>,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction.
    ///
    /// The transaction holds the store lock for its whole lifetime, which is
    /// what serializes concurrent multi-step sequences (notably claim
    /// admission). Transactions are short-lived and must not be held across
    /// suspension points.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self.tables.lock())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use vanlink_primitives::ids::{BackboneId, NetworkId};
    use vanlink_primitives::site::{
        AccessPointKind, AccessPointLifecycle, DeploymentState, SiteClass, SiteLifecycle,
    };

    use super::*;

    fn site(id: &str, backbone: &str) -> SiteRecord {
        SiteRecord::interior(
            id.parse().unwrap(),
            id,
            backbone.parse::<BackboneId>().unwrap(),
        )
    }

    #[test]
    fn uncommitted_writes_roll_back_on_drop() {
        let store = RecordStore::new();

        {
            let mut txn = store.begin();
            txn.put_site(site("s1", "bb1")).unwrap();
            // dropped without commit
        }

        let txn = store.begin();
        assert!(txn.site(&"s1".parse().unwrap()).unwrap().is_none());
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = RecordStore::new();

        let mut txn = store.begin();
        txn.put_site(site("s1", "bb1")).unwrap();
        txn.commit().unwrap();

        let txn = store.begin();
        let loaded = txn.site(&"s1".parse().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.name, "s1");
        assert_eq!(loaded.lifecycle, SiteLifecycle::Partial);
        assert_eq!(loaded.deployment, DeploymentState::NotReady);
    }

    #[test]
    fn reads_see_writes_within_the_same_transaction() {
        let store = RecordStore::new();

        let mut txn = store.begin();
        txn.put_site(site("s1", "bb1")).unwrap();

        let mut loaded = txn.site(&"s1".parse().unwrap()).unwrap().unwrap();
        loaded.lifecycle = SiteLifecycle::Ready;
        txn.put_site(loaded).unwrap();

        let again = txn.site(&"s1".parse().unwrap()).unwrap().unwrap();
        assert_eq!(again.lifecycle, SiteLifecycle::Ready);
    }

    #[test]
    fn deleting_a_site_cascades_to_access_points_certificates_and_member_row() {
        let store = RecordStore::new();
        let site_id: SiteId = "s1".parse().unwrap();
        let ap_id: AccessPointId = "ap1".parse().unwrap();

        let mut txn = store.begin();
        txn.put_site(site("s1", "bb1")).unwrap();
        txn.put_access_point(AccessPointRecord {
            id: ap_id.clone(),
            site: site_id.clone(),
            kind: AccessPointKind::Manage,
            lifecycle: AccessPointLifecycle::New,
            bound: None,
            bound_hash: None,
        })
        .unwrap();
        txn.put_certificate(CertificateRecord {
            site: site_id.clone(),
            key: StateKey::site_client_tls(),
            object: vanlink_primitives::state::StateObject::facts([("cert", "pem")]),
            hash: vanlink_primitives::digest::digest_object(
                &vanlink_primitives::state::StateObject::facts([("cert", "pem")]),
            ),
        })
        .unwrap();
        txn.put_member(MemberSiteRecord {
            site: site_id.clone(),
            invitation: "inv1".parse().unwrap(),
            network: "van1".parse::<NetworkId>().unwrap(),
            name: "s1".to_owned(),
        })
        .unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin();
        txn.delete_site(&site_id).unwrap();
        txn.commit().unwrap();

        let txn = store.begin();
        assert!(txn.site(&site_id).unwrap().is_none());
        assert!(txn.access_point(&ap_id).unwrap().is_none());
        assert!(txn
            .certificate(&site_id, &StateKey::site_client_tls())
            .unwrap()
            .is_none());
        assert!(txn.member(&site_id).unwrap().is_none());
    }

    #[test]
    fn concurrent_increments_are_serialized() {
        let store = RecordStore::new();
        let inv_id: InvitationId = "inv1".parse().unwrap();

        let mut txn = store.begin();
        txn.put_invitation(InvitationRecord {
            id: inv_id.clone(),
            network: "van1".parse().unwrap(),
            join_deadline: Utc::now() + chrono::Duration::minutes(15),
            instance_limit: None,
            instance_count: 0,
            claim_access: "ap-claim".parse().unwrap(),
            member_access: "ap-member".parse().unwrap(),
            site_class: SiteClass::Member,
        })
        .unwrap();
        txn.commit().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let inv_id = inv_id.clone();
                std::thread::spawn(move || {
                    let mut txn = store.begin();
                    let mut inv = txn.invitation(&inv_id).unwrap().unwrap();
                    inv.instance_count += 1;
                    txn.put_invitation(inv).unwrap();
                    txn.commit().unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let txn = store.begin();
        assert_eq!(txn.invitation(&inv_id).unwrap().unwrap().instance_count, 8);
    }
}
