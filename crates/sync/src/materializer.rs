//! The local-object-store seam.
//!
//! An [`ObjectMaterializer`] applies synchronized state to the local runtime
//! environment — certificates, ingress definitions, link descriptors —
//! tagging every object with the state key and content hash it represents.
//! The tags are what allow a restarted endpoint to rebuild its hash sets
//! from [`ObjectMaterializer::list`] instead of starting empty and
//! re-fetching the world.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use vanlink_primitives::digest::ContentHash;
use vanlink_primitives::state::{ObjectKind, StateKey, StateObject};

#[async_trait]
pub trait ObjectMaterializer: Send + Sync + fmt::Debug {
    async fn upsert(
        &self,
        key: &StateKey,
        kind: ObjectKind,
        object: StateObject,
        hash: ContentHash,
    ) -> eyre::Result<()>;

    async fn delete(&self, key: &StateKey, kind: ObjectKind) -> eyre::Result<()>;

    async fn load(
        &self,
        key: &StateKey,
        kind: ObjectKind,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>>;

    /// Every materialized object with its state key and hash annotation.
    async fn list(&self) -> eyre::Result<Vec<(StateKey, ContentHash)>>;
}

/// In-memory materializer; stands in for the platform object store in tests
/// and local runs.
#[derive(Debug, Default)]
pub struct MemoryMaterializer {
    objects: Mutex<BTreeMap<StateKey, (ObjectKind, StateObject, ContentHash)>>,
}

impl MemoryMaterializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of materialized objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectMaterializer for MemoryMaterializer {
    async fn upsert(
        &self,
        key: &StateKey,
        kind: ObjectKind,
        object: StateObject,
        hash: ContentHash,
    ) -> eyre::Result<()> {
        let _previous = self
            .objects
            .lock()
            .insert(key.clone(), (kind, object, hash));
        Ok(())
    }

    async fn delete(&self, key: &StateKey, _kind: ObjectKind) -> eyre::Result<()> {
        let _previous = self.objects.lock().remove(key);
        Ok(())
    }

    async fn load(
        &self,
        key: &StateKey,
        _kind: ObjectKind,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
        Ok(self
            .objects
            .lock()
            .get(key)
            .map(|(_, object, hash)| (object.clone(), hash.clone())))
    }

    async fn list(&self) -> eyre::Result<Vec<(StateKey, ContentHash)>> {
        Ok(self
            .objects
            .lock()
            .iter()
            .map(|(key, (_, _, hash))| (key.clone(), hash.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use vanlink_primitives::digest::digest_object;

    use super::*;

    #[tokio::test]
    async fn upsert_load_delete_round_trip() {
        let materializer = MemoryMaterializer::new();
        let key = StateKey::site_client_tls();
        let object = StateObject::facts([("cert", "pem")]);
        let hash = digest_object(&object);

        materializer
            .upsert(&key, ObjectKind::Credential, object.clone(), hash.clone())
            .await
            .unwrap();

        let (loaded, loaded_hash) = materializer
            .load(&key, ObjectKind::Credential)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, object);
        assert_eq!(loaded_hash, hash);

        assert_eq!(materializer.list().await.unwrap(), vec![(key.clone(), hash)]);

        materializer
            .delete(&key, ObjectKind::Credential)
            .await
            .unwrap();
        assert!(materializer
            .load(&key, ObjectKind::Credential)
            .await
            .unwrap()
            .is_none());
    }
}
