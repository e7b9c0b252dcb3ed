use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid identifier: {0:?}")]
pub struct InvalidId(String);

// todo! wrap a fixed-width byte array instead of a heap string
macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
        )]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn random() -> Self {
                let mut bytes = [0_u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(hex::encode(bytes))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
                    return Err(InvalidId(s.to_owned()));
                }

                Ok(Self(s.to_owned()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type! {
    /// Identity of a site, interior or member.
    SiteId
}

id_type! {
    /// Identity of a backbone network.
    BackboneId
}

id_type! {
    /// Identity of an application network (VAN).
    NetworkId
}

id_type! {
    /// Identity of an access point on a site.
    AccessPointId
}

id_type! {
    /// Identity of a directed link between two interior sites.
    LinkId
}

id_type! {
    /// Identity of an invitation, doubling as the claim token.
    InvitationId
}
