//! The per-peer synchronization state machine.
//!
//! One endpoint instance serves exactly one remote peer. It owns the two
//! hash-set maps for that peer and a single heartbeat deadline; nothing else
//! mutates them, though the delegate may restate the sender-owned set before
//! each heartbeat when ownership lives outside the endpoint. Inbound messages
//! are processed strictly in receipt order — reconciliation for a peer never
//! runs concurrently with itself.
//!
//! Reconciliation is level-triggered: every inbound heartbeat restates the
//! peer's full hash set, and only the keys whose hash differs from what this
//! side last fetched trigger a Get. A dropped or garbled exchange leaves
//! `remote_hashes` untouched, so the very next heartbeat re-drives it.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vanlink_primitives::digest::{digest_object, ContentHash};
use vanlink_primitives::ids::SiteId;
use vanlink_primitives::messages::{DigestMap, SyncMessage};
use vanlink_primitives::state::{KeyNamespace, Role, StateKey, StateObject};

use crate::config::SyncConfig;
use crate::link::{Inbound, PeerLink};
use crate::materializer::ObjectMaterializer;

use async_trait::async_trait;

/// Role-specific side effects of the protocol, injected so the same endpoint
/// drives both the controller and the site end of a connection.
#[async_trait]
pub trait SyncDelegate: Send + Sync + std::fmt::Debug {
    /// Serves a Get for a locally-owned key requested by `peer`.
    async fn load_local(
        &self,
        peer: &SiteId,
        key: &StateKey,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>>;

    /// Runs once per inbound heartbeat, before reconciliation: last-seen
    /// refresh, and on the controller the ready→active promotion.
    async fn on_heartbeat(&self, peer: &SiteId) -> eyre::Result<()>;

    /// Recomputes the full sender-owned hash set for `peer`, called before
    /// every outbound heartbeat so the advertisement reflects state that
    /// changed outside the endpoint (the controller's record store).
    /// `None` keeps the endpoint's running set — the site side, whose
    /// ownership only changes through [`EndpointCommand::Publish`].
    async fn local_digest(&self, peer: &SiteId) -> eyre::Result<Option<DigestMap>>;
}

/// Commands accepted by a running endpoint.
#[derive(Debug)]
pub enum EndpointCommand {
    /// A locally-owned object changed: materialize it (or its absence),
    /// update the local hash set, and send a solicited heartbeat.
    Publish {
        key: StateKey,
        object: Option<StateObject>,
    },
}

/// Handle to a spawned endpoint task.
#[derive(Clone, Debug)]
pub struct EndpointHandle {
    pub peer: SiteId,
    pub inbox: mpsc::Sender<Inbound>,
    pub commands: mpsc::Sender<EndpointCommand>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct SyncEndpoint {
    role: Role,
    local_id: SiteId,
    peer_id: SiteId,
    link: Arc<dyn PeerLink>,
    materializer: Arc<dyn ObjectMaterializer>,
    delegate: Arc<dyn SyncDelegate>,
    config: SyncConfig,

    /// Hashes of the objects this side currently owns and serves.
    local_hashes: DigestMap,
    /// Last hash this side successfully fetched-and-materialized per key.
    /// Mutated only after a fetch lands, never optimistically.
    remote_hashes: DigestMap,

    /// The single pending heartbeat deadline; there is never more than one.
    next_heartbeat: Instant,
}

impl SyncEndpoint {
    #[expect(clippy::too_many_arguments, reason = "construction-only surface")]
    pub fn new(
        role: Role,
        local_id: SiteId,
        peer_id: SiteId,
        link: Arc<dyn PeerLink>,
        materializer: Arc<dyn ObjectMaterializer>,
        delegate: Arc<dyn SyncDelegate>,
        config: SyncConfig,
        local_hashes: DigestMap,
        remote_hashes: DigestMap,
    ) -> Self {
        let next_heartbeat = Instant::now() + config.initial_heartbeat_delay;

        Self {
            role,
            local_id,
            peer_id,
            link,
            materializer,
            delegate,
            config,
            local_hashes,
            remote_hashes,
            next_heartbeat,
        }
    }

    /// Spawns the endpoint onto the runtime, returning its handle.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> EndpointHandle {
        let (inbox_tx, inbox_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let handle = EndpointHandle {
            peer: self.peer_id.clone(),
            inbox: inbox_tx,
            commands: commands_tx,
            cancel: cancel.clone(),
        };

        drop(tokio::spawn(self.run(inbox_rx, commands_rx, cancel)));

        handle
    }

    /// Drives the endpoint until cancellation or link-down.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Inbound>,
        mut commands: mpsc::Receiver<EndpointCommand>,
        cancel: CancellationToken,
    ) {
        debug!(peer=%self.peer_id, role=?self.role, "Sync endpoint up");

        // nudge the peer so both directions converge without waiting a full
        // heartbeat period after connection establishment
        if let Err(err) = self
            .link
            .send(SyncMessage::Solicit {
                from: self.local_id.clone(),
            })
            .await
        {
            warn!(peer=%self.peer_id, %err, "Failed to solicit peer on startup");
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep_until(self.next_heartbeat) => {
                    self.send_heartbeat().await;
                }
                inbound = inbox.recv() => {
                    let Some(inbound) = inbound else {
                        debug!(peer=%self.peer_id, "Inbound channel closed, endpoint down");
                        break;
                    };
                    self.handle_inbound(inbound).await;
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
            }
        }

        debug!(peer=%self.peer_id, "Sync endpoint stopped");
    }

    /// Sends a heartbeat now and schedules the next one. Because sending
    /// always resets the single deadline, a solicited heartbeat implicitly
    /// cancels the pending timer — at most one heartbeat is ever scheduled.
    pub(crate) async fn send_heartbeat(&mut self) {
        match self.delegate.local_digest(&self.peer_id).await {
            Ok(Some(hashes)) => self.local_hashes = hashes,
            Ok(None) => {}
            Err(err) => {
                // advertise the last known set; the next heartbeat retries
                warn!(peer=%self.peer_id, %err, "Failed to recompute local hashes");
            }
        }

        let message = SyncMessage::Heartbeat {
            from: self.local_id.clone(),
            hashes: self.local_hashes.clone(),
        };

        if let Err(err) = self.link.send(message).await {
            warn!(peer=%self.peer_id, %err, "Failed to send heartbeat");
        }

        self.schedule_next_heartbeat();
    }

    fn schedule_next_heartbeat(&mut self) {
        let jitter_ms = self.config.heartbeat_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            time::Duration::ZERO
        } else {
            time::Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };

        self.next_heartbeat = Instant::now() + self.config.heartbeat_interval + jitter;
    }

    pub(crate) async fn handle_inbound(&mut self, inbound: Inbound) {
        let Inbound { message, reply } = inbound;

        match message {
            SyncMessage::Heartbeat { from, hashes } => {
                if let Err(err) = self.delegate.on_heartbeat(&from).await {
                    // transaction failure: already rolled back, reconcile anyway
                    warn!(peer=%from, %err, "Heartbeat side effects failed");
                }
                self.reconcile(hashes).await;
            }
            SyncMessage::Solicit { from } => {
                debug!(peer=%from, "Heartbeat solicited");
                self.send_heartbeat().await;
            }
            SyncMessage::Get { from, key } => {
                let response = self.serve_get(&from, key).await;
                match reply {
                    Some(tx) => {
                        if tx.send(response).is_err() {
                            debug!(peer=%from, "Requester went away before reply");
                        }
                    }
                    None => {
                        if let Err(err) = self.link.send(response).await {
                            warn!(peer=%from, %err, "Failed to send get response");
                        }
                    }
                }
            }
            SyncMessage::GetResponse { key, .. } => {
                // replies travel back through the request's reply slot
                warn!(peer=%self.peer_id, %key, "Unsolicited get response dropped");
            }
            SyncMessage::Claim(_) | SyncMessage::ClaimResponse(_) => {
                // claims are routed to the claim processor before endpoint
                // dispatch; reaching here is a routing bug on the peer
                warn!(peer=%self.peer_id, "Claim traffic on sync endpoint dropped");
            }
        }
    }

    async fn handle_command(&mut self, command: EndpointCommand) {
        match command {
            EndpointCommand::Publish { key, object } => {
                if let Err(err) = self.publish(&key, object).await {
                    warn!(%key, %err, "Failed to publish local state");
                    return;
                }
                self.send_heartbeat().await;
            }
        }
    }

    /// Materializes a locally-owned object (or its deletion) and updates the
    /// local hash set, preserving the invariant that a key's local hash is
    /// null iff the materialized object is absent.
    async fn publish(&mut self, key: &StateKey, object: Option<StateObject>) -> eyre::Result<()> {
        let Some(namespace) = key.namespace() else {
            eyre::bail!("unknown state key namespace: {key}");
        };

        match object {
            Some(object) => {
                let hash = digest_object(&object);
                self.materializer
                    .upsert(key, namespace.kind(), object, hash.clone())
                    .await?;
                let _previous = self.local_hashes.insert(key.clone(), Some(hash));
            }
            None => {
                self.materializer.delete(key, namespace.kind()).await?;
                let _previous = self.local_hashes.insert(key.clone(), None);
            }
        }

        Ok(())
    }

    async fn serve_get(&self, from: &SiteId, key: StateKey) -> SyncMessage {
        let owned = key
            .namespace()
            .is_some_and(|ns| ns.owner() == self.role && ns.replicated());

        if !owned {
            warn!(peer=%from, %key, "Get for a key this side does not own");
            return SyncMessage::GetResponse {
                key,
                hash: None,
                object: None,
            };
        }

        match self.delegate.load_local(from, &key).await {
            Ok(Some((object, hash))) => SyncMessage::GetResponse {
                key,
                hash: Some(hash),
                object: Some(object),
            },
            Ok(None) => SyncMessage::GetResponse {
                key,
                hash: None,
                object: None,
            },
            Err(err) => {
                warn!(peer=%from, %key, %err, "Failed to load local state for get");
                SyncMessage::GetResponse {
                    key,
                    hash: None,
                    object: None,
                }
            }
        }
    }

    /// Runs one reconciliation pass against the peer's restated hash set.
    pub(crate) async fn reconcile(&mut self, hashes: DigestMap) {
        for (key, advertised) in hashes {
            let Some(namespace) = key.namespace() else {
                debug!(%key, "Skipping key with unknown namespace");
                continue;
            };

            // heartbeats carry only sender-owned keys; anything else is a
            // confused peer and must not clobber our own objects
            if namespace.owner() == self.role || !namespace.replicated() {
                warn!(%key, "Peer advertised a key it does not own");
                continue;
            }

            let known = self.remote_hashes.get(&key).cloned().unwrap_or(None);
            if known == advertised {
                continue;
            }

            match advertised {
                None => {
                    if let Err(err) = self.materializer.delete(&key, namespace.kind()).await {
                        warn!(%key, %err, "Failed to delete materialized object");
                        continue;
                    }
                    let _previous = self.remote_hashes.insert(key, None);
                }
                Some(_) => self.fetch_and_materialize(key, namespace).await,
            }
        }
    }

    /// One Get exchange for a stale key. Failures leave `remote_hashes`
    /// untouched so the next heartbeat retries.
    async fn fetch_and_materialize(&mut self, key: StateKey, namespace: KeyNamespace) {
        let request = SyncMessage::Get {
            from: self.local_id.clone(),
            key: key.clone(),
        };

        let response = match self.link.request(request, self.config.request_timeout).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%key, %err, "Get failed, will retry on next heartbeat");
                return;
            }
        };

        let (returned_key, hash, object) = match response {
            SyncMessage::GetResponse { key, hash, object } => (key, hash, object),
            unexpected => {
                warn!(%key, got = unexpected.tag(), "Unexpected reply to get");
                return;
            }
        };

        if returned_key != key {
            warn!(requested=%key, returned=%returned_key, "Get response key mismatch, dropped");
            return;
        }

        match (object, hash) {
            (Some(object), hash) => {
                let hash = hash.unwrap_or_else(|| digest_object(&object));
                if let Err(err) = self
                    .materializer
                    .upsert(&key, namespace.kind(), object, hash.clone())
                    .await
                {
                    warn!(%key, %err, "Failed to materialize fetched object");
                    return;
                }
                let _previous = self.remote_hashes.insert(key, Some(hash));
            }
            (None, _) => {
                // gone between heartbeat and fetch; treat as deletion
                if let Err(err) = self.materializer.delete(&key, namespace.kind()).await {
                    warn!(%key, %err, "Failed to delete materialized object");
                    return;
                }
                let _previous = self.remote_hashes.insert(key, None);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn remote_hash(&self, key: &StateKey) -> Option<ContentHash> {
        self.remote_hashes.get(key).cloned().unwrap_or(None)
    }
}

/// Splits a materializer's annotations into (locally-owned, remotely-owned)
/// hash sets for the given role — how an endpoint resumes after a restart
/// without refetching everything.
///
/// A key the owner deleted while this side was disconnected is simply
/// absent from both the reseeded set and the owner's next heartbeat, so the
/// stale materialized copy survives until the owner republishes that key.
pub async fn seed_from_materializer(
    materializer: &dyn ObjectMaterializer,
    role: Role,
) -> eyre::Result<(DigestMap, DigestMap)> {
    let mut local = DigestMap::new();
    let mut remote = DigestMap::new();

    for (key, hash) in materializer.list().await? {
        let Some(namespace) = key.namespace() else {
            continue;
        };
        if !namespace.replicated() {
            continue;
        }

        if namespace.owner() == role {
            let _previous = local.insert(key, Some(hash));
        } else {
            let _previous = remote.insert(key, Some(hash));
        }
    }

    Ok((local, remote))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;

    use vanlink_primitives::messages::ProtocolError;
    use vanlink_primitives::state::ObjectKind;

    use crate::materializer::MemoryMaterializer;

    use super::*;

    /// Link double that records sends and answers requests from a script.
    #[derive(Debug, Default)]
    struct ScriptedLink {
        sent: Mutex<Vec<SyncMessage>>,
        requests: Mutex<Vec<SyncMessage>>,
        responses: Mutex<VecDeque<Result<SyncMessage, ProtocolError>>>,
    }

    impl ScriptedLink {
        fn respond_with(&self, response: SyncMessage) {
            self.responses.lock().push_back(Ok(response));
        }

        fn fail_next(&self, error: ProtocolError) {
            self.responses.lock().push_back(Err(error));
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl PeerLink for ScriptedLink {
        async fn send(&self, message: SyncMessage) -> eyre::Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn request(
            &self,
            message: SyncMessage,
            budget: Duration,
        ) -> Result<SyncMessage, ProtocolError> {
            self.requests.lock().push(message);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(ProtocolError::Timeout(budget)))
        }

        async fn close(&self) -> eyre::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NullDelegate;

    #[async_trait]
    impl SyncDelegate for NullDelegate {
        async fn load_local(
            &self,
            _peer: &SiteId,
            _key: &StateKey,
        ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
            Ok(None)
        }

        async fn on_heartbeat(&self, _peer: &SiteId) -> eyre::Result<()> {
            Ok(())
        }

        async fn local_digest(&self, _peer: &SiteId) -> eyre::Result<Option<DigestMap>> {
            Ok(None)
        }
    }

    /// Delegate whose owned hash set lives outside the endpoint, like the
    /// controller's store-computed fact sets.
    #[derive(Debug, Default)]
    struct ExternalStateDelegate {
        hashes: Mutex<DigestMap>,
    }

    #[async_trait]
    impl SyncDelegate for ExternalStateDelegate {
        async fn load_local(
            &self,
            _peer: &SiteId,
            _key: &StateKey,
        ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
            Ok(None)
        }

        async fn on_heartbeat(&self, _peer: &SiteId) -> eyre::Result<()> {
            Ok(())
        }

        async fn local_digest(&self, _peer: &SiteId) -> eyre::Result<Option<DigestMap>> {
            Ok(Some(self.hashes.lock().clone()))
        }
    }

    fn site_endpoint(
        link: Arc<ScriptedLink>,
        materializer: Arc<MemoryMaterializer>,
    ) -> SyncEndpoint {
        SyncEndpoint::new(
            Role::Site,
            "site-1".parse().unwrap(),
            "controller".parse().unwrap(),
            link,
            materializer,
            Arc::new(NullDelegate),
            SyncConfig::fast(),
            DigestMap::new(),
            DigestMap::new(),
        )
    }

    fn controller_heartbeat(object: &StateObject) -> (DigestMap, ContentHash) {
        let hash = digest_object(object);
        let mut hashes = DigestMap::new();
        let _previous = hashes.insert(StateKey::site_client_tls(), Some(hash.clone()));
        (hashes, hash)
    }

    #[tokio::test]
    async fn stale_key_is_fetched_and_materialized() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let object = StateObject::facts([("cert", "pem-data")]);
        let (hashes, hash) = controller_heartbeat(&object);

        link.respond_with(SyncMessage::GetResponse {
            key: StateKey::site_client_tls(),
            hash: Some(hash.clone()),
            object: Some(object.clone()),
        });

        endpoint.reconcile(hashes).await;

        assert_eq!(link.request_count(), 1);
        assert_eq!(endpoint.remote_hash(&StateKey::site_client_tls()), Some(hash));

        let (loaded, _) = materializer
            .load(&StateKey::site_client_tls(), ObjectKind::Credential)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, object);
    }

    #[tokio::test]
    async fn identical_heartbeat_is_idempotent() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let object = StateObject::facts([("cert", "pem-data")]);
        let (hashes, hash) = controller_heartbeat(&object);

        link.respond_with(SyncMessage::GetResponse {
            key: StateKey::site_client_tls(),
            hash: Some(hash),
            object: Some(object),
        });

        endpoint.reconcile(hashes.clone()).await;
        assert_eq!(link.request_count(), 1);
        assert_eq!(materializer.len(), 1);

        // restating the same hash set must trigger nothing
        endpoint.reconcile(hashes).await;
        assert_eq!(link.request_count(), 1);
        assert_eq!(materializer.len(), 1);
    }

    #[tokio::test]
    async fn dropped_get_response_heals_on_next_heartbeat() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let object = StateObject::facts([("cert", "pem-data")]);
        let (hashes, hash) = controller_heartbeat(&object);

        link.fail_next(ProtocolError::Timeout(Duration::from_millis(1)));
        endpoint.reconcile(hashes.clone()).await;

        // nothing recorded, nothing materialized
        assert_eq!(endpoint.remote_hash(&StateKey::site_client_tls()), None);
        assert!(materializer.is_empty());

        // same hash set again: the key is still stale, so it is re-requested
        link.respond_with(SyncMessage::GetResponse {
            key: StateKey::site_client_tls(),
            hash: Some(hash.clone()),
            object: Some(object),
        });
        endpoint.reconcile(hashes).await;

        assert_eq!(link.request_count(), 2);
        assert_eq!(endpoint.remote_hash(&StateKey::site_client_tls()), Some(hash));
        assert_eq!(materializer.len(), 1);
    }

    #[tokio::test]
    async fn key_mismatch_response_is_dropped_and_retried_later() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let object = StateObject::facts([("cert", "pem-data")]);
        let (hashes, hash) = controller_heartbeat(&object);

        link.respond_with(SyncMessage::GetResponse {
            key: StateKey::outgoing_links(),
            hash: Some(hash),
            object: Some(object),
        });

        endpoint.reconcile(hashes).await;

        assert_eq!(endpoint.remote_hash(&StateKey::site_client_tls()), None);
        assert!(materializer.is_empty());
    }

    #[tokio::test]
    async fn null_hash_deletes_the_materialized_object() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let object = StateObject::facts([("cert", "pem-data")]);
        let (hashes, hash) = controller_heartbeat(&object);
        link.respond_with(SyncMessage::GetResponse {
            key: StateKey::site_client_tls(),
            hash: Some(hash),
            object: Some(object),
        });
        endpoint.reconcile(hashes).await;
        assert_eq!(materializer.len(), 1);

        let mut removal = DigestMap::new();
        let _previous = removal.insert(StateKey::site_client_tls(), None);
        endpoint.reconcile(removal).await;

        assert!(materializer.is_empty());
        assert_eq!(endpoint.remote_hash(&StateKey::site_client_tls()), None);
        // no Get is issued for a deletion
        assert_eq!(link.request_count(), 1);
    }

    #[tokio::test]
    async fn keys_owned_by_this_side_are_never_reconciled() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        // a site owns access-* keys; a peer advertising one is ignored
        let ap = "ap-1".parse().unwrap();
        let object = StateObject::facts([("host", "h"), ("port", "1")]);
        let mut hashes = DigestMap::new();
        let _previous = hashes.insert(StateKey::access(&ap), Some(digest_object(&object)));

        endpoint.reconcile(hashes).await;

        assert_eq!(link.request_count(), 0);
        assert!(materializer.is_empty());
    }

    #[tokio::test]
    async fn publish_updates_local_hashes_and_solicits_convergence() {
        let link = Arc::new(ScriptedLink::default());
        let materializer = Arc::new(MemoryMaterializer::new());
        let mut endpoint = site_endpoint(Arc::clone(&link), Arc::clone(&materializer));

        let ap = "ap-1".parse().unwrap();
        let key = StateKey::access(&ap);
        let object = StateObject::facts([("host", "edge.example.net"), ("port", "45671")]);

        endpoint
            .handle_command(EndpointCommand::Publish {
                key: key.clone(),
                object: Some(object.clone()),
            })
            .await;

        // the object is materialized and an immediate heartbeat carries it
        assert_eq!(materializer.len(), 1);
        let sent = link.sent.lock();
        let heartbeat = sent
            .iter()
            .find_map(|message| match message {
                SyncMessage::Heartbeat { hashes, .. } => Some(hashes.clone()),
                _ => None,
            })
            .expect("a heartbeat was sent");
        assert_eq!(heartbeat.get(&key), Some(&Some(digest_object(&object))));
    }

    #[tokio::test]
    async fn heartbeats_restate_the_delegates_current_state() {
        let link = Arc::new(ScriptedLink::default());
        let delegate = Arc::new(ExternalStateDelegate::default());
        let mut endpoint = SyncEndpoint::new(
            Role::Controller,
            "controller".parse().unwrap(),
            "site-1".parse().unwrap(),
            Arc::clone(&link) as Arc<_>,
            Arc::new(MemoryMaterializer::new()),
            Arc::clone(&delegate) as Arc<_>,
            SyncConfig::fast(),
            DigestMap::new(),
            DigestMap::new(),
        );

        endpoint.send_heartbeat().await;

        // the owned state changes behind the endpoint's back
        let facts = StateObject::facts([("l1-host", "a.example.net")]);
        let hash = digest_object(&facts);
        let _previous = delegate
            .hashes
            .lock()
            .insert(StateKey::outgoing_links(), Some(hash.clone()));

        endpoint.send_heartbeat().await;

        let sent = link.sent.lock();
        let heartbeats: Vec<_> = sent
            .iter()
            .filter_map(|message| match message {
                SyncMessage::Heartbeat { hashes, .. } => Some(hashes.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(heartbeats.len(), 2);
        assert_eq!(heartbeats[0].get(&StateKey::outgoing_links()), None);
        assert_eq!(
            heartbeats[1].get(&StateKey::outgoing_links()),
            Some(&Some(hash))
        );
    }

    #[tokio::test]
    async fn seed_splits_by_ownership() {
        let materializer = MemoryMaterializer::new();
        let ap = "ap-1".parse().unwrap();

        let client = StateObject::facts([("cert", "pem")]);
        let access = StateObject::facts([("host", "h"), ("port", "1")]);
        materializer
            .upsert(
                &StateKey::site_client_tls(),
                ObjectKind::Credential,
                client.clone(),
                digest_object(&client),
            )
            .await
            .unwrap();
        materializer
            .upsert(
                &StateKey::access(&ap),
                ObjectKind::FactSet,
                access.clone(),
                digest_object(&access),
            )
            .await
            .unwrap();

        let (local, remote) = seed_from_materializer(&materializer, Role::Site)
            .await
            .unwrap();

        assert!(local.contains_key(&StateKey::access(&ap)));
        assert!(remote.contains_key(&StateKey::site_client_tls()));
        assert_eq!(local.len(), 1);
        assert_eq!(remote.len(), 1);
    }
}
