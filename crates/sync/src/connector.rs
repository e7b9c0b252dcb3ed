//! The per-backbone connection lifecycle manager.
//!
//! One manage link is kept open per backbone whose management ingress is
//! resolved and ready in the record store. Each pass is mark-and-sweep: mark
//! every open link for deletion, un-mark the ones still desired, open the
//! missing ones, close what stayed marked. The desired set comes from a
//! single transactional read; if that read fails the pass makes no
//! connection changes at all and the next pass runs on the shortened retry
//! cadence.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vanlink_primitives::ids::BackboneId;
use vanlink_primitives::site::{AccessPointKind, AccessPointLifecycle, HostPort};
use vanlink_store::RecordStore;

use crate::config::SyncConfig;
use crate::link::{LinkDialer, OpenedLink, PeerLink};

/// Receives each newly opened manage link; the controller's implementation
/// spawns a router over it.
#[async_trait]
pub trait LinkHandler: Send + Sync + std::fmt::Debug {
    async fn on_link_open(
        &self,
        backbone: &BackboneId,
        opened: OpenedLink,
        cancel: CancellationToken,
    ) -> eyre::Result<()>;
}

#[derive(Debug)]
struct OpenLink {
    link: Arc<dyn PeerLink>,
    cancel: CancellationToken,
    to_delete: bool,
}

#[derive(Debug)]
pub struct ConnectionManager {
    store: RecordStore,
    dialer: Arc<dyn LinkDialer>,
    handler: Arc<dyn LinkHandler>,
    config: SyncConfig,
    links: parking_lot::Mutex<BTreeMap<BackboneId, OpenLink>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        store: RecordStore,
        dialer: Arc<dyn LinkDialer>,
        handler: Arc<dyn LinkHandler>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            dialer,
            handler,
            config,
            links: parking_lot::Mutex::default(),
        }
    }

    #[must_use]
    pub fn open_backbones(&self) -> Vec<BackboneId> {
        self.links.lock().keys().cloned().collect()
    }

    /// Runs reconcile passes until cancelled, then closes every open link.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let delay = match self.reconcile_pass(&cancel).await {
                Ok(()) => self.config.connector_interval,
                Err(err) => {
                    warn!(%err, "Connection pass failed, retrying sooner");
                    self.config.connector_retry
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep(delay) => {}
            }
        }

        let open: Vec<_> = {
            let mut links = self.links.lock();
            std::mem::take(&mut *links).into_iter().collect()
        };
        for (backbone, open_link) in open {
            open_link.cancel.cancel();
            if let Err(err) = open_link.link.close().await {
                warn!(%backbone, %err, "Failed to close link on shutdown");
            }
        }
    }

    /// One mark-and-sweep pass.
    pub async fn reconcile_pass(&self, cancel: &CancellationToken) -> eyre::Result<()> {
        // transactional read; an error here aborts the pass before any
        // connection state is touched
        let desired = self.desired_links()?;

        let to_open: Vec<(BackboneId, HostPort)> = {
            let mut links = self.links.lock();
            for open_link in links.values_mut() {
                open_link.to_delete = true;
            }

            desired
                .into_iter()
                .filter(|(backbone, _)| {
                    if let Some(open_link) = links.get_mut(backbone) {
                        open_link.to_delete = false;
                        false
                    } else {
                        true
                    }
                })
                .collect()
        };

        let mut failures = 0_usize;
        for (backbone, address) in to_open {
            match self.open_link(&backbone, &address, cancel).await {
                Ok(()) => info!(%backbone, %address, "Opened manage link"),
                Err(err) => {
                    warn!(%backbone, %address, %err, "Failed to open manage link");
                    failures += 1;
                }
            }
        }

        let swept: Vec<_> = {
            let mut links = self.links.lock();
            let doomed: Vec<BackboneId> = links
                .iter()
                .filter(|(_, open_link)| open_link.to_delete)
                .map(|(backbone, _)| backbone.clone())
                .collect();
            doomed
                .into_iter()
                .filter_map(|backbone| links.remove(&backbone).map(|link| (backbone, link)))
                .collect()
        };
        for (backbone, open_link) in swept {
            debug!(%backbone, "Closing manage link no longer desired");
            open_link.cancel.cancel();
            if let Err(err) = open_link.link.close().await {
                warn!(%backbone, %err, "Failed to close link");
            }
        }

        if failures > 0 {
            eyre::bail!("{failures} link(s) failed to open");
        }

        Ok(())
    }

    /// The desired link set: one resolved, ready manage access point per
    /// backbone, first wins.
    fn desired_links(&self) -> eyre::Result<Vec<(BackboneId, HostPort)>> {
        let txn = self.store.begin();

        let mut desired: BTreeMap<BackboneId, HostPort> = BTreeMap::new();
        for access_point in txn.access_points()? {
            if access_point.kind != AccessPointKind::Manage
                || access_point.lifecycle != AccessPointLifecycle::Ready
            {
                continue;
            }
            let Some(bound) = access_point.bound else {
                // ingress not resolved yet
                continue;
            };
            let Some(site) = txn.site(&access_point.site)? else {
                continue;
            };
            let Some(backbone) = site.backbone else {
                continue;
            };
            let _first_wins = desired.entry(backbone).or_insert(bound);
        }

        Ok(desired.into_iter().collect())
    }

    async fn open_link(
        &self,
        backbone: &BackboneId,
        address: &HostPort,
        cancel: &CancellationToken,
    ) -> eyre::Result<()> {
        let opened = self.dialer.dial(address).await?;
        let link = Arc::clone(&opened.link);
        let link_cancel = cancel.child_token();

        self.handler
            .on_link_open(backbone, opened, link_cancel.clone())
            .await?;

        let _previous = self.links.lock().insert(
            backbone.clone(),
            OpenLink {
                link,
                cancel: link_cancel,
                to_delete: false,
            },
        );

        Ok(())
    }
}
