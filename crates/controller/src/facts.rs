//! Link fact sets served under the `links/*` keys.
//!
//! These objects are never stored; they are recomputed from the topology
//! tables on every Get, and their hashes are recomputed whenever a heartbeat
//! must advertise them. Field names are prefixed with the link id so the
//! flat map stays canonical and collision-free.

use vanlink_primitives::ids::SiteId;
use vanlink_primitives::site::{AccessPointKind, HostPort};
use vanlink_primitives::state::{ObjectKind, StateObject};
use vanlink_store::Transaction;

/// Connector facts for every link `site` dials out through. For a member
/// site this is the single ingress its invitation attaches it through — the
/// same object the claim handshake delivered, so post-claim heartbeats
/// restate an identical hash. For interior sites, links whose listener has
/// no resolved peer ingress yet are left out; the fact set's hash changes
/// when resolution lands and reconciliation picks it up.
pub fn outgoing_links(txn: &Transaction<'_>, site: &SiteId) -> eyre::Result<StateObject> {
    if let Some(member) = txn.member(site)? {
        let ingress = txn
            .invitation(&member.invitation)?
            .map(|invitation| txn.access_point(&invitation.member_access))
            .transpose()?
            .flatten()
            .and_then(|ap| ap.bound);

        return Ok(match ingress {
            Some(bound) => member_outgoing(&bound),
            None => StateObject::new(ObjectKind::FactSet, Vec::new()),
        });
    }

    let mut fields = Vec::new();

    for link in txn.links_connecting_from(site)? {
        let ingress = txn
            .access_points_of(&link.listening)?
            .into_iter()
            .find(|ap| ap.kind == AccessPointKind::Peer)
            .and_then(|ap| ap.bound);
        let Some(bound) = ingress else {
            continue;
        };

        fields.push((format!("{}-host", link.id), bound.host));
        fields.push((format!("{}-port", link.id), bound.port.to_string()));
        fields.push((format!("{}-cost", link.id), link.cost.to_string()));
    }

    Ok(StateObject::new(ObjectKind::FactSet, fields))
}

/// Listener facts for every link terminating at `site`.
pub fn incoming_links(txn: &Transaction<'_>, site: &SiteId) -> eyre::Result<StateObject> {
    let mut fields = Vec::new();

    for link in txn.links_listening_at(site)? {
        fields.push((format!("{}-from", link.id), link.connecting.to_string()));
        fields.push((format!("{}-cost", link.id), link.cost.to_string()));
    }

    Ok(StateObject::new(ObjectKind::FactSet, fields))
}

/// Connector facts handed to an admitted member: the single member ingress
/// it attaches through.
#[must_use]
pub fn member_outgoing(bound: &HostPort) -> StateObject {
    StateObject::new(
        ObjectKind::FactSet,
        [
            ("host".to_owned(), bound.host.clone()),
            ("port".to_owned(), bound.port.to_string()),
        ],
    )
}
