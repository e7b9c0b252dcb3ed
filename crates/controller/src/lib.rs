//! Controller-side fleet logic.
//!
//! Everything here sits behind the synchronization core's seams: the
//! [`activation::ControllerCore`] activates a [`vanlink_sync::SyncEndpoint`]
//! per site, [`claim::ClaimProcessor`] admits member sites, and
//! [`deployment`] keeps the derived readiness state of interior sites
//! consistent with the topology.

pub mod activation;
pub mod claim;
pub mod deployment;
pub mod facts;
pub mod materializer;

pub use activation::{controller_stack, BackboneLinkHandler, ControllerCore, ControllerDelegate};
pub use claim::{ClaimProcessor, CredentialSource};
pub use materializer::StoreMaterializer;
