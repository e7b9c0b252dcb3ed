//! Shared primitive types for the vanlink control plane.
//!
//! Everything here is substrate-free: no runtime, no storage, no transport.
//! The other crates build the synchronization protocol and the controller
//! policy on top of these types.

pub mod digest;
pub mod ids;
pub mod messages;
pub mod site;
pub mod state;
