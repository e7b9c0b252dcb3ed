//! Content digests for synchronizable state.
//!
//! A digest is a *change detector*, not a MAC: it decides whether a peer's
//! copy of an object is stale, nothing more. Both sides compute digests over
//! their own authoritative local state; digests received from a peer are
//! never used to arbitrate between two conflicting values.
//!
//! Determinism matters: the digest is computed over the object's field pairs
//! in canonical (lexicographic) key order. [`StateObject`] stores its fields
//! in a `BTreeMap`, so iteration order is already canonical.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::state::{ObjectKind, StateObject};

/// Hex-encoded SHA-256 digest of one state object.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ContentHash(String);

impl ContentHash {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Digests a state object: the kind tag followed by each `name=value` field
/// pair in canonical order, with separators so field boundaries are
/// unambiguous.
#[must_use]
pub fn digest_object(object: &StateObject) -> ContentHash {
    let mut hasher = Sha256::new();

    let kind = match object.kind {
        ObjectKind::Credential => "credential",
        ObjectKind::FactSet => "fact-set",
    };
    hasher.update(kind.as_bytes());
    hasher.update(b"\n");

    for (name, value) in &object.fields {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }

    ContentHash(hex::encode(hasher.finalize()))
}
