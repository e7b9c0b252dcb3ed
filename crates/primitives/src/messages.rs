//! Wire messages of the synchronization protocol.
//!
//! One sum type covers every message kind so dispatchers match exhaustively;
//! the transport's encoding of these types is not part of this crate's
//! contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::ContentHash;
use crate::ids::{InvitationId, SiteId};
use crate::state::{StateKey, StateObject};

/// The unit of heartbeat exchange: every replicated key the sender owns,
/// mapped to its current content hash, `None` meaning the object does not
/// exist.
pub type DigestMap = BTreeMap<StateKey, Option<ContentHash>>;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// Periodic (or solicited) restatement of the sender's full local hash
    /// set. Level-triggered: a dropped heartbeat is healed by the next one.
    Heartbeat { from: SiteId, hashes: DigestMap },
    /// "Send me a heartbeat now."
    Solicit { from: SiteId },
    /// Request for the current value of one remotely-owned key.
    Get { from: SiteId, key: StateKey },
    /// Reply to [`SyncMessage::Get`]. `object` is `None` when the key no
    /// longer exists on the owner.
    GetResponse {
        key: StateKey,
        hash: Option<ContentHash>,
        object: Option<StateObject>,
    },
    /// Claim handshake request, carried on the same transport but logically
    /// independent of hash reconciliation.
    Claim(ClaimRequest),
    /// Reply to [`SyncMessage::Claim`].
    ClaimResponse(ClaimResponse),
}

impl SyncMessage {
    /// Short tag for logging.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "heartbeat",
            Self::Solicit { .. } => "solicit",
            Self::Get { .. } => "get",
            Self::GetResponse { .. } => "get-response",
            Self::Claim(_) => "claim",
            Self::ClaimResponse(_) => "claim-response",
        }
    }
}

/// Redeems an invitation token for a member site identity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClaimRequest {
    pub token: InvitationId,
    pub proposed_name: String,
}

/// Outcome of a claim, with an HTTP-flavored status code so callers can tell
/// rejection (400-class, invitation still usable unless exhausted) from
/// delivery failure after admission (500-class, instance consumed).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClaimResponse {
    pub status_code: u16,
    pub message: String,
    pub outcome: Option<ClaimOutcome>,
}

impl ClaimResponse {
    #[must_use]
    pub fn joined(outcome: ClaimOutcome) -> Self {
        Self {
            status_code: 200,
            message: "claim accepted".to_owned(),
            outcome: Some(outcome),
        }
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status_code: 400,
            message: message.into(),
            outcome: None,
        }
    }

    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status_code: 500,
            message: message.into(),
            outcome: None,
        }
    }
}

/// Everything a successful claimant needs to come up as a member site.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClaimOutcome {
    pub site_id: SiteId,
    /// The member's identity credential (`tls/site-client`).
    pub identity: StateObject,
    pub identity_hash: ContentHash,
    /// Connector facts for the member's outgoing links (`links/outgoing`).
    pub outgoing_links: StateObject,
    pub outgoing_links_hash: ContentHash,
}

/// Transient protocol errors; none of these are retried at this layer — the
/// next heartbeat cycle re-drives the exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("peer link closed")]
    LinkClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_response_classes() {
        let rejected = ClaimResponse::rejected("Instance limit reached");
        assert_eq!(rejected.status_code, 400);
        assert!(rejected.outcome.is_none());

        let failed = ClaimResponse::internal_error("delivery failed");
        assert_eq!(failed.status_code, 500);
        assert!(failed.outcome.is_none());
    }

    #[test]
    fn message_tags_cover_all_variants() {
        let from: SiteId = "s1".parse().unwrap();
        let heartbeat = SyncMessage::Heartbeat {
            from: from.clone(),
            hashes: DigestMap::new(),
        };
        let solicit = SyncMessage::Solicit { from };

        assert_eq!(heartbeat.tag(), "heartbeat");
        assert_eq!(solicit.tag(), "solicit");
    }
}
