//! State keys and the namespace registry.
//!
//! A [`StateKey`] names one synchronizable unit of configuration. Every key
//! belongs to exactly one [`KeyNamespace`], and all behavior that depends on
//! the key (which peer owns it, what kind of object it materializes as, where
//! the object is injected) is looked up through the registry rather than
//! re-derived by parsing the key string at use sites.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::AccessPointId;

/// Which end of a connection a party is.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Controller,
    Site,
}

impl Role {
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Controller => Self::Site,
            Self::Site => Self::Controller,
        }
    }
}

/// The materialized shape of a state object.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    /// A credential bundle (certificate, key, CA).
    Credential,
    /// A flat set of facts (host/port/cost and friends).
    FactSet,
}

/// Where a materialized object is consumed in the local runtime.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Injection {
    /// Installed as a TLS profile on the local router.
    TlsProfile,
    /// Translated into link listeners/connectors.
    LinkConfig,
    /// Fed back into the durable record store as resolved ingress facts.
    IngressFacts,
    /// Staged locally to initiate a claim; never replicated.
    ClaimBootstrap,
}

/// Registry of key namespaces.
///
/// Ownership is fixed per namespace and identical on both peers' views of the
/// same key: what the controller owns, a site treats as remote, and vice
/// versa.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyNamespace {
    /// `tls/site-client` — the site's client identity credential.
    SiteClientTls,
    /// `tls-server-<access point>` — server credential for one access point.
    ServerTls,
    /// `links/incoming` — listener facts for links terminating at this site.
    IncomingLinks,
    /// `links/outgoing` — connector facts for links departing this site.
    OutgoingLinks,
    /// `access-<access point>` — resolved ingress facts, reported upward.
    Access,
    /// `claim/credential` and `claim/ingress` — staged claim bootstrap
    /// material, local to the claimant.
    ClaimBootstrap,
}

impl KeyNamespace {
    pub const ALL: &'static [Self] = &[
        Self::SiteClientTls,
        Self::ServerTls,
        Self::IncomingLinks,
        Self::OutgoingLinks,
        Self::Access,
        Self::ClaimBootstrap,
    ];

    /// The role that is authoritative for keys in this namespace and pushes
    /// them outward; the other role fetches.
    #[must_use]
    pub const fn owner(self) -> Role {
        match self {
            Self::SiteClientTls | Self::ServerTls | Self::IncomingLinks | Self::OutgoingLinks => {
                Role::Controller
            }
            Self::Access | Self::ClaimBootstrap => Role::Site,
        }
    }

    #[must_use]
    pub const fn kind(self) -> ObjectKind {
        match self {
            Self::SiteClientTls | Self::ServerTls => ObjectKind::Credential,
            Self::IncomingLinks | Self::OutgoingLinks | Self::Access => ObjectKind::FactSet,
            Self::ClaimBootstrap => ObjectKind::Credential,
        }
    }

    #[must_use]
    pub const fn injection(self) -> Injection {
        match self {
            Self::SiteClientTls | Self::ServerTls => Injection::TlsProfile,
            Self::IncomingLinks | Self::OutgoingLinks => Injection::LinkConfig,
            Self::Access => Injection::IngressFacts,
            Self::ClaimBootstrap => Injection::ClaimBootstrap,
        }
    }

    /// Whether keys in this namespace participate in heartbeat exchange.
    #[must_use]
    pub const fn replicated(self) -> bool {
        !matches!(self, Self::ClaimBootstrap)
    }
}

/// A namespaced identifier for one synchronizable configuration unit.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct StateKey(String);

impl StateKey {
    #[must_use]
    pub fn site_client_tls() -> Self {
        Self("tls/site-client".to_owned())
    }

    #[must_use]
    pub fn server_tls(access_point: &AccessPointId) -> Self {
        Self(format!("tls-server-{access_point}"))
    }

    #[must_use]
    pub fn incoming_links() -> Self {
        Self("links/incoming".to_owned())
    }

    #[must_use]
    pub fn outgoing_links() -> Self {
        Self("links/outgoing".to_owned())
    }

    #[must_use]
    pub fn access(access_point: &AccessPointId) -> Self {
        Self(format!("access-{access_point}"))
    }

    #[must_use]
    pub fn claim_credential() -> Self {
        Self("claim/credential".to_owned())
    }

    #[must_use]
    pub fn claim_ingress() -> Self {
        Self("claim/ingress".to_owned())
    }

    /// Looks the key up in the namespace registry.
    ///
    /// Returns `None` for keys minted by a newer peer with namespaces this
    /// build does not know; callers skip those rather than guessing.
    #[must_use]
    pub fn namespace(&self) -> Option<KeyNamespace> {
        let key = self.0.as_str();

        match key {
            "tls/site-client" => Some(KeyNamespace::SiteClientTls),
            "links/incoming" => Some(KeyNamespace::IncomingLinks),
            "links/outgoing" => Some(KeyNamespace::OutgoingLinks),
            "claim/credential" | "claim/ingress" => Some(KeyNamespace::ClaimBootstrap),
            _ if key.starts_with("tls-server-") => Some(KeyNamespace::ServerTls),
            _ if key.starts_with("access-") => Some(KeyNamespace::Access),
            _ => None,
        }
    }

    /// For keys in the `Access` or `ServerTls` namespaces, the access point
    /// the key is scoped to.
    #[must_use]
    pub fn access_point(&self) -> Option<AccessPointId> {
        let id = match self.namespace()? {
            KeyNamespace::Access => self.0.strip_prefix("access-")?,
            KeyNamespace::ServerTls => self.0.strip_prefix("tls-server-")?,
            _ => return None,
        };
        id.parse().ok()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One synchronizable object: its materialized kind plus an ordered field
/// map. The ordering of `fields` is canonical (lexicographic), which is what
/// makes content digests deterministic.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateObject {
    pub kind: ObjectKind,
    pub fields: BTreeMap<String, String>,
}

impl StateObject {
    #[must_use]
    pub fn new(kind: ObjectKind, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            kind,
            fields: fields.into_iter().collect(),
        }
    }

    /// Convenience constructor for fact sets from borrowed pairs.
    #[must_use]
    pub fn facts<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            kind: ObjectKind::FactSet,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }
}
