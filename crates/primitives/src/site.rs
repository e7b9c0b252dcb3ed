use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a site within the overlay.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteClass {
    /// A backbone node forming transit topology.
    Interior,
    /// A tenant node joined to an application network via claim.
    Member,
}

/// Lifecycle of a site record.
///
/// Normal progression is `partial → new → ready → active`; `expired` and
/// `failed` are terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteLifecycle {
    Partial,
    New,
    Ready,
    Active,
    Expired,
    Failed,
}

impl SiteLifecycle {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Failed)
    }
}

/// Derived readiness classification of an interior site for rollout.
///
/// Derivation rules live in the controller crate; this type only carries the
/// outcome.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentState {
    NotReady,
    ReadyBootstrap,
    ReadyAutomatic,
    Deployed,
}

/// Kind of an access point exposed by a site.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPointKind {
    /// Management ingress, dialed by the controller's connection manager.
    Manage,
    /// Inter-router ingress for backbone links.
    Peer,
    /// Ingress member sites attach to.
    Member,
    /// Ingress used only to initiate a claim.
    Claim,
}

/// Lifecycle of an access point; `ready` means ingress is resolved and the
/// bound host/port is populated.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPointLifecycle {
    New,
    Ready,
    Failed,
}

/// A resolved network address for an access point.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
