//! Fleet state synchronization between the management controller and its
//! sites.
//!
//! The protocol is hash-digest based, eventually consistent, and
//! level-triggered: every heartbeat restates the sender's full hash set, so
//! any dropped message is healed by the next cycle and no acknowledgement
//! bookkeeping exists anywhere. Repair is idempotent under retransmission
//! and duplicate delivery.
//!
//! - [`endpoint::SyncEndpoint`] — the per-peer reconciliation state machine
//! - [`connector::ConnectionManager`] — keeps manage links open per backbone
//! - [`router::Router`] — demultiplexes one backbone link into per-site
//!   endpoints, activating them lazily
//! - [`link`] / [`materializer`] — the transport and local-object-store
//!   seams this crate is generic over

pub mod config;
pub mod connector;
pub mod endpoint;
pub mod link;
pub mod materializer;
pub mod memory_link;
pub mod registry;
pub mod router;

pub use config::SyncConfig;
pub use connector::{ConnectionManager, LinkHandler};
pub use endpoint::{
    seed_from_materializer, EndpointCommand, EndpointHandle, SyncDelegate, SyncEndpoint,
};
pub use link::{Inbound, LinkDialer, OpenedLink, PeerLink};
pub use materializer::{MemoryMaterializer, ObjectMaterializer};
pub use registry::PeerRegistry;
pub use router::{EndpointFactory, Router};
