//! The transport seam.
//!
//! A [`PeerLink`] is a bidirectional message channel to exactly one remote
//! party. Reliable delivery is *not* part of the contract — the protocol is
//! level-triggered and self-heals — but request/reply correlation is: a
//! request carries a dynamic reply address (the [`Inbound::reply`] slot on
//! the receiving side) so the responder never needs to know how to route a
//! reply itself.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use vanlink_primitives::messages::{ProtocolError, SyncMessage};
use vanlink_primitives::site::HostPort;

/// One message delivered by a link, with the reply address populated when
/// the sender awaits a correlated reply.
#[derive(Debug)]
pub struct Inbound {
    pub message: SyncMessage,
    pub reply: Option<oneshot::Sender<SyncMessage>>,
}

impl Inbound {
    #[must_use]
    pub fn fire_and_forget(message: SyncMessage) -> Self {
        Self {
            message,
            reply: None,
        }
    }
}

/// Outbound half of a connection to one remote peer.
#[async_trait]
pub trait PeerLink: Send + Sync + fmt::Debug {
    /// Fire-and-forget send. Losing the message is acceptable; the protocol
    /// restates state on the next heartbeat.
    async fn send(&self, message: SyncMessage) -> eyre::Result<()>;

    /// Correlated request/reply with an explicit budget.
    async fn request(
        &self,
        message: SyncMessage,
        budget: Duration,
    ) -> Result<SyncMessage, ProtocolError>;

    async fn close(&self) -> eyre::Result<()>;
}

/// A freshly established link: the outbound handle plus the inbound stream.
/// The receiver yielding `None` is the connection-down signal.
#[derive(Debug)]
pub struct OpenedLink {
    pub link: Arc<dyn PeerLink>,
    pub inbound: mpsc::Receiver<Inbound>,
}

/// Opens links to resolved management ingresses. Implementations carry the
/// dialing node's TLS identity; the synchronization core never sees key
/// material.
#[async_trait]
pub trait LinkDialer: Send + Sync + fmt::Debug {
    async fn dial(&self, address: &HostPort) -> eyre::Result<OpenedLink>;
}
