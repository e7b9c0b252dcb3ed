use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vanlink_primitives::digest::ContentHash;
use vanlink_primitives::ids::{
    AccessPointId, BackboneId, InvitationId, LinkId, NetworkId, SiteId,
};
use vanlink_primitives::site::{
    AccessPointKind, AccessPointLifecycle, DeploymentState, HostPort, SiteClass, SiteLifecycle,
};
use vanlink_primitives::state::{StateKey, StateObject};

/// One site, interior or member.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteRecord {
    pub id: SiteId,
    pub name: String,
    pub class: SiteClass,
    /// The backbone this site belongs to; member sites carry the backbone
    /// they attach through.
    pub backbone: Option<BackboneId>,
    pub network: Option<NetworkId>,
    pub lifecycle: SiteLifecycle,
    pub deployment: DeploymentState,
    /// Refreshed by every heartbeat; display-only, never used for eviction
    /// by this subsystem.
    pub last_seen: Option<DateTime<Utc>>,
}

impl SiteRecord {
    /// A freshly created interior site, before any configuration exists.
    #[must_use]
    pub fn interior(id: SiteId, name: impl Into<String>, backbone: BackboneId) -> Self {
        Self {
            id,
            name: name.into(),
            class: SiteClass::Interior,
            backbone: Some(backbone),
            network: None,
            lifecycle: SiteLifecycle::Partial,
            deployment: DeploymentState::NotReady,
            last_seen: None,
        }
    }
}

/// An ingress exposed by a site. `bound` is populated by the external
/// ingress resolver; until then the access point is unusable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPointRecord {
    pub id: AccessPointId,
    pub site: SiteId,
    pub kind: AccessPointKind,
    pub lifecycle: AccessPointLifecycle,
    pub bound: Option<HostPort>,
    /// Content hash of the reported ingress facts, kept so a restarted
    /// controller can seed its remote hash set without refetching.
    pub bound_hash: Option<ContentHash>,
}

/// A directed edge in the backbone topology: `connecting` dials `listening`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub id: LinkId,
    pub listening: SiteId,
    pub connecting: SiteId,
    pub cost: u32,
}

/// A claim token. `instance_count` only moves forward, and only inside the
/// store transaction that admits a claimant.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRecord {
    pub id: InvitationId,
    pub network: NetworkId,
    pub join_deadline: DateTime<Utc>,
    pub instance_limit: Option<u32>,
    pub instance_count: u32,
    /// The access point a claimant dials to run the handshake.
    pub claim_access: AccessPointId,
    /// The access point admitted members connect through.
    pub member_access: AccessPointId,
    pub site_class: SiteClass,
}

/// Created exactly once per successful claim.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSiteRecord {
    pub site: SiteId,
    pub invitation: InvitationId,
    pub network: NetworkId,
    pub name: String,
}

/// A credential bundle the controller holds for a site, addressed by the
/// state key it is served under.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub site: SiteId,
    pub key: StateKey,
    pub object: StateObject,
    pub hash: ContentHash,
}
