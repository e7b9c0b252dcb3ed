//! Runs a site's sync endpoint over its manage link.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use vanlink_primitives::ids::{AccessPointId, SiteId};
use vanlink_primitives::site::HostPort;
use vanlink_primitives::state::{Role, StateKey, StateObject};
use vanlink_sync::{
    seed_from_materializer, EndpointCommand, EndpointHandle, MemoryMaterializer, OpenedLink,
    SyncConfig, SyncEndpoint,
};

use crate::delegate::SiteDelegate;

/// One site's synchronization runtime. Unlike the controller, a site talks
/// to exactly one peer, so it drives a single endpoint directly on the
/// link — no router, no registry.
#[derive(Debug)]
pub struct SiteAgent {
    id: SiteId,
    controller: SiteId,
    config: SyncConfig,
    materializer: Arc<MemoryMaterializer>,
}

impl SiteAgent {
    #[must_use]
    pub fn new(id: SiteId, controller: SiteId, config: SyncConfig) -> Self {
        Self::with_materializer(id, controller, config, Arc::new(MemoryMaterializer::new()))
    }

    /// Reuses an existing object store — the claimant's, so a site attaches
    /// with the identity its claim just delivered.
    #[must_use]
    pub fn with_materializer(
        id: SiteId,
        controller: SiteId,
        config: SyncConfig,
        materializer: Arc<MemoryMaterializer>,
    ) -> Self {
        Self {
            id,
            controller,
            config,
            materializer,
        }
    }

    /// The local object store; injection layers and the claimant share it.
    #[must_use]
    pub fn materializer(&self) -> Arc<MemoryMaterializer> {
        Arc::clone(&self.materializer)
    }

    /// Attaches the endpoint to an established manage link. Hash sets are
    /// rebuilt from the materializer, so a restarted site resumes where it
    /// left off instead of refetching the world.
    pub async fn attach(
        &self,
        opened: OpenedLink,
        cancel: CancellationToken,
    ) -> eyre::Result<EndpointHandle> {
        let OpenedLink { link, mut inbound } = opened;

        let (local, remote) = seed_from_materializer(&*self.materializer, Role::Site).await?;
        debug!(site = %self.id, local = local.len(), remote = remote.len(), "Seeded from materializer");

        let delegate = Arc::new(SiteDelegate::new(self.materializer()));
        let endpoint = SyncEndpoint::new(
            Role::Site,
            self.id.clone(),
            self.controller.clone(),
            link,
            self.materializer(),
            delegate,
            self.config,
            local,
            remote,
        );
        let handle = endpoint.spawn(cancel.clone());

        // pump link traffic into the endpoint's inbox
        let inbox = handle.inbox.clone();
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    next = inbound.recv() => {
                        let Some(message) = next else { break };
                        if inbox.send(message).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));

        Ok(handle)
    }

    /// Reports a freshly resolved ingress upward: materializes the facts
    /// under the access point's key and lets the endpoint advertise them.
    pub async fn report_ingress(
        &self,
        handle: &EndpointHandle,
        access_point: &AccessPointId,
        bound: &HostPort,
    ) -> eyre::Result<()> {
        let facts = StateObject::facts([
            ("host", bound.host.as_str()),
            ("port", bound.port.to_string().as_str()),
        ]);

        handle
            .commands
            .send(EndpointCommand::Publish {
                key: StateKey::access(access_point),
                object: Some(facts),
            })
            .await
            .map_err(|_| eyre::eyre!("endpoint is gone"))
    }
}
