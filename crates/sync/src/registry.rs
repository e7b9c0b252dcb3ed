//! Registry of live per-peer endpoints.
//!
//! Owned by whoever runs the connection fan-in (the controller's router, or
//! a test harness) and passed by injection; there is deliberately no
//! module-scope registry, so independent endpoint sets can coexist in one
//! process.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use vanlink_primitives::ids::SiteId;

use crate::endpoint::EndpointHandle;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<BTreeMap<SiteId, EndpointHandle>>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, peer: &SiteId) -> Option<EndpointHandle> {
        self.peers.lock().get(peer).cloned()
    }

    pub fn insert(&self, handle: EndpointHandle) {
        let _previous = self.peers.lock().insert(handle.peer.clone(), handle);
    }

    /// Removes and cancels one peer's endpoint.
    pub fn remove(&self, peer: &SiteId) {
        if let Some(handle) = self.peers.lock().remove(peer) {
            handle.cancel.cancel();
        }
    }
}
