//! The site-side agent.
//!
//! A site joins a network once through the [`claim::Claimant`] handshake,
//! then keeps itself converged with the controller through a single
//! [`vanlink_sync::SyncEndpoint`] attached to its manage link. All remote
//! state lands in an in-memory materializer; injection into the local
//! router (TLS profiles, link config) consumes it from there.

pub mod agent;
pub mod claim;
pub mod delegate;

pub use agent::SiteAgent;
pub use claim::{stage_bootstrap, Claimant, ClaimPhase};
pub use delegate::SiteDelegate;
