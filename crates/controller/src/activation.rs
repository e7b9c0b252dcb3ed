//! Wires the synchronization core to the controller's record store.
//!
//! [`ControllerDelegate`] supplies the protocol's side effects (serving
//! Gets from store state, heartbeat liveness and lifecycle promotion);
//! [`ControllerCore`] builds and seeds a [`SyncEndpoint`] whenever a site
//! makes first contact over a backbone link; [`BackboneLinkHandler`] spawns
//! a router over every manage link the connection manager opens.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vanlink_primitives::digest::{digest_object, ContentHash};
use vanlink_primitives::ids::{BackboneId, SiteId};
use vanlink_primitives::messages::{ClaimRequest, ClaimResponse, DigestMap};
use vanlink_primitives::site::SiteLifecycle;
use vanlink_primitives::state::{KeyNamespace, Role, StateKey, StateObject};
use vanlink_store::{RecordStore, Transaction};
use vanlink_sync::{
    ConnectionManager, EndpointFactory, EndpointHandle, LinkDialer, LinkHandler, OpenedLink,
    PeerLink, PeerRegistry, Router, SyncConfig, SyncDelegate, SyncEndpoint,
};

use crate::claim::{ClaimProcessor, CredentialSource};
use crate::deployment;
use crate::facts;
use crate::materializer::StoreMaterializer;

/// The controller-owned hash set for `peer` as the store stands right now:
/// certificate rows plus the computed link fact sets. Recomputed before
/// every heartbeat, so topology changes committed by any path — claims,
/// ingress resolution, link edits — are advertised without anyone having
/// to notify the endpoint.
fn owned_digest(txn: &Transaction<'_>, peer: &SiteId) -> eyre::Result<DigestMap> {
    let mut local = DigestMap::new();

    for certificate in txn.certificates_of(peer)? {
        let _previous = local.insert(certificate.key, Some(certificate.hash));
    }

    let incoming = facts::incoming_links(txn, peer)?;
    let _previous = local.insert(StateKey::incoming_links(), Some(digest_object(&incoming)));
    let outgoing = facts::outgoing_links(txn, peer)?;
    let _previous = local.insert(StateKey::outgoing_links(), Some(digest_object(&outgoing)));

    Ok(local)
}

/// Protocol side effects backed by the record store.
#[derive(Clone, Debug)]
pub struct ControllerDelegate {
    store: RecordStore,
}

impl ControllerDelegate {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SyncDelegate for ControllerDelegate {
    async fn load_local(
        &self,
        peer: &SiteId,
        key: &StateKey,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
        let txn = self.store.begin();

        match key.namespace() {
            Some(KeyNamespace::SiteClientTls | KeyNamespace::ServerTls) => Ok(txn
                .certificate(peer, key)?
                .map(|record| (record.object, record.hash))),
            Some(KeyNamespace::IncomingLinks) => {
                let object = facts::incoming_links(&txn, peer)?;
                let hash = digest_object(&object);
                Ok(Some((object, hash)))
            }
            Some(KeyNamespace::OutgoingLinks) => {
                let object = facts::outgoing_links(&txn, peer)?;
                let hash = digest_object(&object);
                Ok(Some((object, hash)))
            }
            _ => Ok(None),
        }
    }

    async fn on_heartbeat(&self, peer: &SiteId) -> eyre::Result<()> {
        let mut txn = self.store.begin();

        let Some(mut site) = txn.site(peer)? else {
            warn!(%peer, "Heartbeat from a site with no record");
            return Ok(());
        };

        site.last_seen = Some(Utc::now());
        let promoted = site.lifecycle == SiteLifecycle::Ready;
        if promoted {
            info!(%peer, "Site is heartbeating, promoting to active");
            site.lifecycle = SiteLifecycle::Active;
        }
        txn.put_site(site)?;

        if promoted {
            deployment::site_became_active(&mut txn, peer)?;
        }

        txn.commit()
    }

    async fn local_digest(&self, peer: &SiteId) -> eyre::Result<Option<DigestMap>> {
        let txn = self.store.begin();
        owned_digest(&txn, peer).map(Some)
    }
}

/// Builds one seeded endpoint per site on first contact, and processes
/// claims.
#[derive(Debug)]
pub struct ControllerCore {
    local_id: SiteId,
    store: RecordStore,
    config: SyncConfig,
    delegate: Arc<ControllerDelegate>,
    materializer: Arc<StoreMaterializer>,
    claims: ClaimProcessor,
}

impl ControllerCore {
    #[must_use]
    pub fn new(
        local_id: SiteId,
        store: RecordStore,
        config: SyncConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            local_id,
            delegate: Arc::new(ControllerDelegate::new(store.clone())),
            materializer: Arc::new(StoreMaterializer::new(store.clone())),
            claims: ClaimProcessor::new(store.clone(), credentials),
            store,
            config,
        }
    }

    /// The two hash sets a fresh endpoint for `peer` starts from: locally
    /// owned hashes from certificate rows plus the computed link fact sets,
    /// remote hashes from whatever ingress the site last reported. An access
    /// point whose facts the site retracted while disconnected is absent
    /// here rather than null, so its stale row stays until the site
    /// republishes that key.
    pub fn seed_for_site(&self, peer: &SiteId) -> eyre::Result<(DigestMap, DigestMap)> {
        let txn = self.store.begin();

        if txn.site(peer)?.is_none() {
            eyre::bail!("no record for site {peer}");
        }

        let local = owned_digest(&txn, peer)?;

        let mut remote = DigestMap::new();
        for access_point in txn.access_points_of(peer)? {
            if let Some(hash) = access_point.bound_hash {
                let _previous =
                    remote.insert(StateKey::access(&access_point.id), Some(hash));
            }
        }

        Ok((local, remote))
    }
}

#[async_trait]
impl EndpointFactory for ControllerCore {
    async fn activate(
        &self,
        peer: &SiteId,
        link: Arc<dyn PeerLink>,
        cancel: CancellationToken,
    ) -> eyre::Result<EndpointHandle> {
        let (local, remote) = self.seed_for_site(peer)?;
        debug!(%peer, local = local.len(), remote = remote.len(), "Seeded endpoint hash sets");

        let endpoint = SyncEndpoint::new(
            Role::Controller,
            self.local_id.clone(),
            peer.clone(),
            link,
            Arc::clone(&self.materializer) as Arc<_>,
            Arc::clone(&self.delegate) as Arc<_>,
            self.config,
            local,
            remote,
        );

        Ok(endpoint.spawn(cancel))
    }

    async fn handle_claim(&self, request: ClaimRequest) -> ClaimResponse {
        self.claims.handle(request).await
    }
}

/// Spawns a router over each manage link the connection manager opens.
#[derive(Debug)]
pub struct BackboneLinkHandler {
    registry: Arc<PeerRegistry>,
    factory: Arc<ControllerCore>,
}

impl BackboneLinkHandler {
    #[must_use]
    pub fn new(registry: Arc<PeerRegistry>, factory: Arc<ControllerCore>) -> Self {
        Self { registry, factory }
    }
}

#[async_trait]
impl LinkHandler for BackboneLinkHandler {
    async fn on_link_open(
        &self,
        backbone: &BackboneId,
        opened: OpenedLink,
        cancel: CancellationToken,
    ) -> eyre::Result<()> {
        info!(%backbone, "Routing sync traffic for backbone");

        let router = Router::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.factory) as Arc<dyn EndpointFactory>,
        );
        drop(tokio::spawn(async move {
            router.run(opened, cancel).await;
        }));

        Ok(())
    }
}

/// Assembles the whole controller side: claims, endpoint activation and the
/// per-backbone connection manager. Run the returned manager to completion.
#[must_use]
pub fn controller_stack(
    local_id: SiteId,
    store: RecordStore,
    config: SyncConfig,
    credentials: Arc<dyn CredentialSource>,
    dialer: Arc<dyn LinkDialer>,
) -> Arc<ConnectionManager> {
    let registry = Arc::new(PeerRegistry::new());
    let core = Arc::new(ControllerCore::new(local_id, store.clone(), config, credentials));
    let handler = Arc::new(BackboneLinkHandler::new(registry, core));

    Arc::new(ConnectionManager::new(store, dialer, handler, config))
}

#[cfg(test)]
mod tests {
    use vanlink_primitives::site::{
        AccessPointKind, AccessPointLifecycle, DeploymentState, HostPort,
    };
    use vanlink_store::{AccessPointRecord, CertificateRecord, LinkRecord, SiteRecord};

    use super::*;

    #[derive(Debug)]
    struct NoCredentials;

    #[async_trait]
    impl CredentialSource for NoCredentials {
        async fn issue_identity(
            &self,
            _site: &SiteId,
            _name: &str,
        ) -> eyre::Result<StateObject> {
            eyre::bail!("not under test")
        }
    }

    fn store_with_site() -> (RecordStore, SiteId) {
        let store = RecordStore::new();
        let site: SiteId = "s1".parse().unwrap();
        let mut txn = store.begin();
        let mut record = SiteRecord::interior(site.clone(), "s1", "bb".parse().unwrap());
        record.lifecycle = SiteLifecycle::Ready;
        txn.put_site(record).unwrap();
        txn.commit().unwrap();
        (store, site)
    }

    fn core(store: &RecordStore) -> ControllerCore {
        ControllerCore::new(
            "controller".parse().unwrap(),
            store.clone(),
            SyncConfig::fast(),
            Arc::new(NoCredentials),
        )
    }

    #[tokio::test]
    async fn heartbeat_promotes_ready_sites_and_stamps_liveness() {
        let (store, site) = store_with_site();
        let delegate = ControllerDelegate::new(store.clone());

        delegate.on_heartbeat(&site).await.unwrap();

        let record = store.begin().site(&site).unwrap().unwrap();
        assert_eq!(record.lifecycle, SiteLifecycle::Active);
        assert_eq!(record.deployment, DeploymentState::Deployed);
        assert!(record.last_seen.is_some());

        // a second heartbeat only refreshes last_seen
        delegate.on_heartbeat(&site).await.unwrap();
        let again = store.begin().site(&site).unwrap().unwrap();
        assert_eq!(again.lifecycle, SiteLifecycle::Active);
        assert!(again.last_seen >= record.last_seen);
    }

    #[tokio::test]
    async fn get_is_served_from_certificate_rows_and_computed_facts() {
        let (store, site) = store_with_site();
        let identity = StateObject::facts([("cert", "pem")]);
        let hash = digest_object(&identity);
        let mut txn = store.begin();
        txn.put_certificate(CertificateRecord {
            site: site.clone(),
            key: StateKey::site_client_tls(),
            object: identity.clone(),
            hash: hash.clone(),
        })
        .unwrap();
        txn.commit().unwrap();

        let delegate = ControllerDelegate::new(store);

        let loaded = delegate
            .load_local(&site, &StateKey::site_client_tls())
            .await
            .unwrap();
        assert_eq!(loaded, Some((identity, hash)));

        // link fact sets are always servable, even when empty
        let (links, _) = delegate
            .load_local(&site, &StateKey::incoming_links())
            .await
            .unwrap()
            .unwrap();
        assert!(links.fields.is_empty());
    }

    #[test]
    fn seed_covers_certificates_facts_and_reported_ingress() {
        let (store, site) = store_with_site();
        let identity = StateObject::facts([("cert", "pem")]);
        let ingress = StateObject::facts([("host", "h"), ("port", "1")]);
        let ingress_hash = digest_object(&ingress);

        let mut txn = store.begin();
        txn.put_certificate(CertificateRecord {
            site: site.clone(),
            key: StateKey::site_client_tls(),
            object: identity.clone(),
            hash: digest_object(&identity),
        })
        .unwrap();
        txn.put_access_point(AccessPointRecord {
            id: "ap-1".parse().unwrap(),
            site: site.clone(),
            kind: AccessPointKind::Manage,
            lifecycle: AccessPointLifecycle::Ready,
            bound: Some(HostPort {
                host: "h".to_owned(),
                port: 1,
            }),
            bound_hash: Some(ingress_hash.clone()),
        })
        .unwrap();
        txn.commit().unwrap();

        let (local, remote) = core(&store).seed_for_site(&site).unwrap();

        assert!(local.contains_key(&StateKey::site_client_tls()));
        assert!(local.contains_key(&StateKey::incoming_links()));
        assert!(local.contains_key(&StateKey::outgoing_links()));
        assert_eq!(
            remote.get(&StateKey::access(&"ap-1".parse().unwrap())),
            Some(&Some(ingress_hash))
        );
    }

    #[tokio::test]
    async fn heartbeat_digest_tracks_link_and_ingress_changes() {
        let (store, site) = store_with_site();
        let delegate = ControllerDelegate::new(store.clone());

        let before = delegate.local_digest(&site).await.unwrap().unwrap();

        // a new upstream with a resolved peer ingress, linked after the
        // endpoint is already running
        let mut txn = store.begin();
        txn.put_site(SiteRecord::interior(
            "hub".parse().unwrap(),
            "hub",
            "bb".parse().unwrap(),
        ))
        .unwrap();
        txn.put_access_point(AccessPointRecord {
            id: "hub-peer".parse().unwrap(),
            site: "hub".parse().unwrap(),
            kind: AccessPointKind::Peer,
            lifecycle: AccessPointLifecycle::Ready,
            bound: Some(HostPort {
                host: "hub.example.net".to_owned(),
                port: 45671,
            }),
            bound_hash: None,
        })
        .unwrap();
        txn.put_link(LinkRecord {
            id: "l1".parse().unwrap(),
            listening: "hub".parse().unwrap(),
            connecting: site.clone(),
            cost: 10,
        })
        .unwrap();
        txn.commit().unwrap();

        let after = delegate.local_digest(&site).await.unwrap().unwrap();

        assert_ne!(
            before.get(&StateKey::outgoing_links()),
            after.get(&StateKey::outgoing_links())
        );
        let txn = store.begin();
        let outgoing = facts::outgoing_links(&txn, &site).unwrap();
        assert_eq!(
            after.get(&StateKey::outgoing_links()),
            Some(&Some(digest_object(&outgoing)))
        );
    }

    #[test]
    fn unknown_sites_cannot_activate() {
        let (store, _site) = store_with_site();
        assert!(core(&store).seed_for_site(&"ghost".parse().unwrap()).is_err());
    }
}
