//! Demultiplexes one backbone link into per-site endpoints.
//!
//! All interior sites of a backbone reach the controller through that
//! backbone's single manage link. The router attributes each inbound
//! message to its sending site and forwards it to the matching endpoint
//! task, activating one lazily on first contact. Claim traffic has no site
//! identity yet and short-circuits to the claim processor instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vanlink_primitives::ids::SiteId;
use vanlink_primitives::messages::{ClaimRequest, ClaimResponse, SyncMessage};

use crate::endpoint::EndpointHandle;
use crate::link::{Inbound, OpenedLink, PeerLink};
use crate::registry::PeerRegistry;

/// Builds endpoint state for peers as they appear, and answers claims.
#[async_trait]
pub trait EndpointFactory: Send + Sync + std::fmt::Debug {
    /// Called on first contact from an unseen site id; returns the spawned
    /// endpoint's handle with its hash sets seeded.
    async fn activate(
        &self,
        peer: &SiteId,
        link: Arc<dyn PeerLink>,
        cancel: CancellationToken,
    ) -> eyre::Result<EndpointHandle>;

    async fn handle_claim(&self, request: ClaimRequest) -> ClaimResponse;
}

#[derive(Debug)]
pub struct Router {
    registry: Arc<PeerRegistry>,
    factory: Arc<dyn EndpointFactory>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<PeerRegistry>, factory: Arc<dyn EndpointFactory>) -> Self {
        Self { registry, factory }
    }

    /// Consumes a link's inbound stream until cancellation or link-down,
    /// then tears down every endpoint that was activated over it.
    pub async fn run(&self, opened: OpenedLink, cancel: CancellationToken) {
        let OpenedLink { link, mut inbound } = opened;
        let endpoints = cancel.child_token();
        let mut activated: Vec<SiteId> = Vec::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = inbound.recv() => {
                    let Some(message) = next else {
                        debug!("Link down, router stopping");
                        break;
                    };
                    self.dispatch(message, &link, &endpoints, &mut activated).await;
                }
            }
        }

        // endpoints bound to a dead link are useless; the connection
        // manager's next pass re-establishes the link and first contact
        // re-activates them
        endpoints.cancel();
        for peer in activated {
            self.registry.remove(&peer);
        }
    }

    async fn dispatch(
        &self,
        inbound: Inbound,
        link: &Arc<dyn PeerLink>,
        endpoints: &CancellationToken,
        activated: &mut Vec<SiteId>,
    ) {
        let from = match &inbound.message {
            SyncMessage::Heartbeat { from, .. }
            | SyncMessage::Solicit { from }
            | SyncMessage::Get { from, .. } => from.clone(),
            SyncMessage::Claim(request) => {
                let response = self.factory.handle_claim(request.clone()).await;
                let response = SyncMessage::ClaimResponse(response);
                match inbound.reply {
                    Some(tx) => {
                        if tx.send(response).is_err() {
                            debug!("Claimant went away before reply");
                        }
                    }
                    None => {
                        if let Err(err) = link.send(response).await {
                            warn!(%err, "Failed to send claim response");
                        }
                    }
                }
                return;
            }
            SyncMessage::GetResponse { .. } | SyncMessage::ClaimResponse(_) => {
                // replies travel through request reply slots, never bare
                warn!(tag = inbound.message.tag(), "Unroutable reply dropped");
                return;
            }
        };

        let handle = match self.registry.get(&from) {
            Some(handle) => handle,
            None => {
                match self
                    .factory
                    .activate(&from, Arc::clone(link), endpoints.child_token())
                    .await
                {
                    Ok(handle) => {
                        info!(peer=%from, "Activated sync endpoint on first contact");
                        self.registry.insert(handle.clone());
                        activated.push(from.clone());
                        handle
                    }
                    Err(err) => {
                        warn!(peer=%from, %err, "Failed to activate endpoint, message dropped");
                        return;
                    }
                }
            }
        };

        if handle.inbox.send(inbound).await.is_err() {
            warn!(peer=%from, "Endpoint task gone, removing from registry");
            self.registry.remove(&from);
        }
    }
}
