//! In-memory duplex link for tests and local simulation.
//!
//! Two [`MemoryLink`]s form a connection; each end's sends surface on the
//! other end's inbound receiver. Reply drops can be injected to exercise the
//! protocol's self-healing path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use vanlink_primitives::messages::{ProtocolError, SyncMessage};

use crate::link::{Inbound, OpenedLink, PeerLink};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct MemoryLink {
    outbox: mpsc::Sender<Inbound>,
    drop_replies: AtomicBool,
}

impl MemoryLink {
    /// When set, requests are still delivered to the peer but their replies
    /// are discarded — the requester observes a timeout, as if the response
    /// message had been lost in transit.
    pub fn set_drop_replies(&self, drop: bool) {
        self.drop_replies.store(drop, Ordering::Relaxed);
    }
}

/// Creates a connected pair of links.
#[must_use]
pub fn pair() -> (OpenedLink, OpenedLink) {
    let ((a, _), (b, _)) = pair_with_faults();
    (a, b)
}

/// Like [`pair`], but also hands back the concrete ends so tests can inject
/// reply loss after the [`OpenedLink`]s have been consumed.
#[must_use]
pub fn pair_with_faults() -> ((OpenedLink, Arc<MemoryLink>), (OpenedLink, Arc<MemoryLink>)) {
    let (a_to_b, b_inbound) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_to_a, a_inbound) = mpsc::channel(CHANNEL_CAPACITY);

    let a_link = Arc::new(MemoryLink {
        outbox: a_to_b,
        drop_replies: AtomicBool::new(false),
    });
    let b_link = Arc::new(MemoryLink {
        outbox: b_to_a,
        drop_replies: AtomicBool::new(false),
    });

    let a = OpenedLink {
        link: Arc::clone(&a_link) as Arc<dyn PeerLink>,
        inbound: a_inbound,
    };
    let b = OpenedLink {
        link: Arc::clone(&b_link) as Arc<dyn PeerLink>,
        inbound: b_inbound,
    };

    ((a, a_link), (b, b_link))
}

#[async_trait]
impl PeerLink for MemoryLink {
    async fn send(&self, message: SyncMessage) -> eyre::Result<()> {
        self.outbox
            .send(Inbound::fire_and_forget(message))
            .await
            .map_err(|_closed| eyre::eyre!("peer link closed"))
    }

    async fn request(
        &self,
        message: SyncMessage,
        budget: Duration,
    ) -> Result<SyncMessage, ProtocolError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.outbox
            .send(Inbound {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_closed| ProtocolError::LinkClosed)?;

        if self.drop_replies.load(Ordering::Relaxed) {
            // let the peer answer, then lose the reply on the floor
            let _lost = timeout(budget, reply_rx).await;
            return Err(ProtocolError::Timeout(budget));
        }

        match timeout(budget, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_closed)) => Err(ProtocolError::LinkClosed),
            Err(_elapsed) => Err(ProtocolError::Timeout(budget)),
        }
    }

    async fn close(&self) -> eyre::Result<()> {
        // dropping the sender is observed as connection-down by the peer
        Ok(())
    }
}
