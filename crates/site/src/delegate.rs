//! Site-side protocol side effects.

use std::sync::Arc;

use async_trait::async_trait;

use vanlink_primitives::digest::ContentHash;
use vanlink_primitives::ids::SiteId;
use vanlink_primitives::messages::DigestMap;
use vanlink_primitives::state::{StateKey, StateObject};
use vanlink_sync::{ObjectMaterializer, SyncDelegate};

/// Serves Gets for site-owned keys straight from the local materializer;
/// liveness bookkeeping is the controller's concern, so heartbeats have no
/// local side effects.
#[derive(Debug)]
pub struct SiteDelegate {
    materializer: Arc<dyn ObjectMaterializer>,
}

impl SiteDelegate {
    #[must_use]
    pub fn new(materializer: Arc<dyn ObjectMaterializer>) -> Self {
        Self { materializer }
    }
}

#[async_trait]
impl SyncDelegate for SiteDelegate {
    async fn load_local(
        &self,
        _peer: &SiteId,
        key: &StateKey,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
        let Some(namespace) = key.namespace() else {
            return Ok(None);
        };

        self.materializer.load(key, namespace.kind()).await
    }

    async fn on_heartbeat(&self, _peer: &SiteId) -> eyre::Result<()> {
        Ok(())
    }

    // site-owned keys only change through publishes to the endpoint itself,
    // so its running hash set is already current
    async fn local_digest(&self, _peer: &SiteId) -> eyre::Result<Option<DigestMap>> {
        Ok(None)
    }
}
