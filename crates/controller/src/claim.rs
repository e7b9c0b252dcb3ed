//! Claim handshake, controller side.
//!
//! Admission is one store transaction: invitation checks, instance count
//! increment, site and member rows. Assembly of the claimant's bundle runs
//! after commit and is a distinct failure domain — if it fails, the
//! invitation instance is already consumed and the claimant gets a
//! 500-class answer rather than a rejection, so operators can tell "try a
//! different token" from "retry delivery".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use vanlink_primitives::digest::digest_object;
use vanlink_primitives::ids::SiteId;
use vanlink_primitives::messages::{ClaimOutcome, ClaimRequest, ClaimResponse};
use vanlink_primitives::site::{DeploymentState, HostPort, SiteLifecycle};
use vanlink_primitives::state::{StateKey, StateObject};
use vanlink_store::{CertificateRecord, MemberSiteRecord, RecordStore, SiteRecord};

use crate::facts;

/// Issues identity credentials for admitted member sites. Certificate
/// authority mechanics live behind this seam.
#[async_trait]
pub trait CredentialSource: Send + Sync + std::fmt::Debug {
    async fn issue_identity(&self, site: &SiteId, name: &str) -> eyre::Result<StateObject>;
}

enum Admission {
    Admitted(AdmittedSite),
    Rejected(&'static str),
}

struct AdmittedSite {
    site: SiteId,
    name: String,
    member_ingress: HostPort,
}

#[derive(Clone, Debug)]
pub struct ClaimProcessor {
    store: RecordStore,
    credentials: Arc<dyn CredentialSource>,
}

impl ClaimProcessor {
    #[must_use]
    pub fn new(store: RecordStore, credentials: Arc<dyn CredentialSource>) -> Self {
        Self { store, credentials }
    }

    pub async fn handle(&self, request: ClaimRequest) -> ClaimResponse {
        let admitted = match self.admit(&request) {
            Ok(Admission::Admitted(admitted)) => admitted,
            Ok(Admission::Rejected(reason)) => {
                info!(token = %request.token, reason, "Claim rejected");
                return ClaimResponse::rejected(reason);
            }
            Err(err) => {
                warn!(token = %request.token, %err, "Claim admission failed");
                return ClaimResponse::internal_error("claim could not be processed");
            }
        };

        match self.assemble(&admitted).await {
            Ok(outcome) => {
                info!(token = %request.token, site = %admitted.site, "Claim admitted");
                ClaimResponse::joined(outcome)
            }
            Err(err) => {
                warn!(token = %request.token, site = %admitted.site, %err,
                    "Claim bundle assembly failed after admission");
                ClaimResponse::internal_error("invitation consumed, delivery failed")
            }
        }
    }

    /// The admission transaction. Holding the store transaction across the
    /// whole check-increment-insert sequence is what makes concurrent claims
    /// against the same invitation race-free.
    fn admit(&self, request: &ClaimRequest) -> eyre::Result<Admission> {
        let mut txn = self.store.begin();

        let Some(mut invitation) = txn.invitation(&request.token)? else {
            return Ok(Admission::Rejected("No such invitation"));
        };
        if Utc::now() > invitation.join_deadline {
            return Ok(Admission::Rejected("No such invitation"));
        }
        if invitation
            .instance_limit
            .is_some_and(|limit| invitation.instance_count >= limit)
        {
            return Ok(Admission::Rejected("Instance limit reached"));
        }

        let Some(member_access) = txn.access_point(&invitation.member_access)? else {
            eyre::bail!("invitation {} has no member access point", invitation.id);
        };
        let Some(member_ingress) = member_access.bound.clone() else {
            eyre::bail!("member ingress {} is not resolved yet", member_access.id);
        };
        let Some(ingress_site) = txn.site(&member_access.site)? else {
            eyre::bail!("member access point {} has no site", member_access.id);
        };

        invitation.instance_count += 1;

        let site = SiteId::random();
        txn.put_site(SiteRecord {
            id: site.clone(),
            name: request.proposed_name.clone(),
            class: invitation.site_class,
            backbone: ingress_site.backbone,
            network: Some(invitation.network.clone()),
            lifecycle: SiteLifecycle::New,
            deployment: DeploymentState::NotReady,
            last_seen: None,
        })?;
        txn.put_member(MemberSiteRecord {
            site: site.clone(),
            invitation: invitation.id.clone(),
            network: invitation.network.clone(),
            name: request.proposed_name.clone(),
        })?;
        txn.put_invitation(invitation)?;
        txn.commit()?;

        Ok(Admission::Admitted(AdmittedSite {
            site,
            name: request.proposed_name.clone(),
            member_ingress,
        }))
    }

    /// Post-commit: issue the identity credential, persist it so later
    /// heartbeat reconciliation serves the same bytes, and compute the
    /// member's connector facts.
    async fn assemble(&self, admitted: &AdmittedSite) -> eyre::Result<ClaimOutcome> {
        let identity = self
            .credentials
            .issue_identity(&admitted.site, &admitted.name)
            .await?;
        let identity_hash = digest_object(&identity);

        let mut txn = self.store.begin();
        txn.put_certificate(CertificateRecord {
            site: admitted.site.clone(),
            key: StateKey::site_client_tls(),
            object: identity.clone(),
            hash: identity_hash.clone(),
        })?;
        txn.commit()?;

        let outgoing_links = facts::member_outgoing(&admitted.member_ingress);
        let outgoing_links_hash = digest_object(&outgoing_links);

        Ok(ClaimOutcome {
            site_id: admitted.site.clone(),
            identity,
            identity_hash,
            outgoing_links,
            outgoing_links_hash,
        })
    }
}
