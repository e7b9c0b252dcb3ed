//! Claim handshake, claimant side.
//!
//! A claimant starts from staged bootstrap material (a one-shot credential
//! and the claim ingress address, both held under non-replicated `claim/*`
//! keys) and runs `awaiting-name → processing → joined | failed`. The
//! bootstrap objects are deleted only after the returned identity and link
//! facts are durably materialized; a failure at any earlier point leaves
//! them in place so the claim can be retried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use vanlink_primitives::digest::digest_object;
use vanlink_primitives::ids::{InvitationId, SiteId};
use vanlink_primitives::messages::{ClaimRequest, SyncMessage};
use vanlink_primitives::state::{ObjectKind, StateKey, StateObject};
use vanlink_sync::{ObjectMaterializer, PeerLink};

/// Where a claim attempt currently stands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClaimPhase {
    AwaitingName,
    Processing,
    Joined { site: SiteId },
    Failed { message: String },
}

/// Stages the claim bootstrap objects a claimant needs before it can dial
/// out: the one-shot credential and the resolved claim ingress.
pub async fn stage_bootstrap(
    materializer: &dyn ObjectMaterializer,
    credential: StateObject,
    ingress: StateObject,
) -> eyre::Result<()> {
    let credential_hash = digest_object(&credential);
    materializer
        .upsert(
            &StateKey::claim_credential(),
            ObjectKind::Credential,
            credential,
            credential_hash,
        )
        .await?;

    let ingress_hash = digest_object(&ingress);
    materializer
        .upsert(
            &StateKey::claim_ingress(),
            ObjectKind::Credential,
            ingress,
            ingress_hash,
        )
        .await
}

#[derive(Debug)]
pub struct Claimant {
    token: InvitationId,
    link: Arc<dyn PeerLink>,
    materializer: Arc<dyn ObjectMaterializer>,
    timeout: Duration,
    phase: ClaimPhase,
}

impl Claimant {
    #[must_use]
    pub fn new(
        token: InvitationId,
        link: Arc<dyn PeerLink>,
        materializer: Arc<dyn ObjectMaterializer>,
        timeout: Duration,
    ) -> Self {
        Self {
            token,
            link,
            materializer,
            timeout,
            phase: ClaimPhase::AwaitingName,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &ClaimPhase {
        &self.phase
    }

    /// Runs the handshake with the given site name. Errors only on misuse
    /// (a second submission); protocol and materialization failures land in
    /// [`ClaimPhase::Failed`].
    pub async fn submit(&mut self, proposed_name: &str) -> eyre::Result<ClaimPhase> {
        if self.phase != ClaimPhase::AwaitingName {
            eyre::bail!("claim already submitted");
        }
        self.phase = ClaimPhase::Processing;

        let request = SyncMessage::Claim(ClaimRequest {
            token: self.token.clone(),
            proposed_name: proposed_name.to_owned(),
        });

        let reply = match self.link.request(request, self.timeout).await {
            Ok(reply) => reply,
            Err(err) => return Ok(self.fail(format!("claim request failed: {err}"))),
        };
        let response = match reply {
            SyncMessage::ClaimResponse(response) => response,
            unexpected => {
                return Ok(self.fail(format!("unexpected {} in reply to claim", unexpected.tag())))
            }
        };

        let Some(outcome) = response.outcome else {
            return Ok(self.fail(response.message));
        };

        // identity and link facts must be durable before the bootstrap
        // material goes away; a crash in between leaves both, never neither
        if let Err(err) = self
            .materializer
            .upsert(
                &StateKey::site_client_tls(),
                ObjectKind::Credential,
                outcome.identity,
                outcome.identity_hash,
            )
            .await
        {
            return Ok(self.fail(format!("failed to store identity: {err}")));
        }
        if let Err(err) = self
            .materializer
            .upsert(
                &StateKey::outgoing_links(),
                ObjectKind::FactSet,
                outcome.outgoing_links,
                outcome.outgoing_links_hash,
            )
            .await
        {
            return Ok(self.fail(format!("failed to store link facts: {err}")));
        }

        for key in [StateKey::claim_credential(), StateKey::claim_ingress()] {
            if let Err(err) = self.materializer.delete(&key, ObjectKind::Credential).await {
                // joined regardless; stale bootstrap material is inert
                warn!(%key, %err, "Failed to discard claim bootstrap object");
            }
        }

        info!(site = %outcome.site_id, "Claim complete, site joined");
        self.phase = ClaimPhase::Joined {
            site: outcome.site_id,
        };
        Ok(self.phase.clone())
    }

    fn fail(&mut self, message: String) -> ClaimPhase {
        warn!(token = %self.token, reason = %message, "Claim failed");
        self.phase = ClaimPhase::Failed { message };
        self.phase.clone()
    }
}
