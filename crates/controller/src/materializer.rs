//! Materializes site-reported objects into the record store.
//!
//! The only site-owned replicated namespace is `access-*`: resolved ingress
//! facts, folded back into the access point row as its bound address. The
//! reported hash is kept on the row so a restarted controller seeds its
//! remote hash set from the store instead of refetching every object.

use async_trait::async_trait;
use tracing::debug;

use vanlink_primitives::digest::ContentHash;
use vanlink_primitives::site::{AccessPointLifecycle, HostPort};
use vanlink_primitives::state::{KeyNamespace, ObjectKind, StateKey, StateObject};
use vanlink_store::RecordStore;
use vanlink_sync::ObjectMaterializer;

#[derive(Clone, Debug)]
pub struct StoreMaterializer {
    store: RecordStore,
}

impl StoreMaterializer {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

fn ingress_from(object: &StateObject) -> eyre::Result<HostPort> {
    let host = object
        .fields
        .get("host")
        .ok_or_else(|| eyre::eyre!("ingress facts missing host"))?
        .clone();
    let port = object
        .fields
        .get("port")
        .ok_or_else(|| eyre::eyre!("ingress facts missing port"))?
        .parse()?;

    Ok(HostPort { host, port })
}

fn ingress_facts(bound: &HostPort) -> StateObject {
    StateObject::new(
        ObjectKind::FactSet,
        [
            ("host".to_owned(), bound.host.clone()),
            ("port".to_owned(), bound.port.to_string()),
        ],
    )
}

#[async_trait]
impl ObjectMaterializer for StoreMaterializer {
    async fn upsert(
        &self,
        key: &StateKey,
        _kind: ObjectKind,
        object: StateObject,
        hash: ContentHash,
    ) -> eyre::Result<()> {
        if key.namespace() != Some(KeyNamespace::Access) {
            eyre::bail!("controller does not materialize {key}");
        }
        let Some(id) = key.access_point() else {
            eyre::bail!("malformed access key {key}");
        };

        let bound = ingress_from(&object)?;

        let mut txn = self.store.begin();
        let Some(mut record) = txn.access_point(&id)? else {
            eyre::bail!("ingress facts for unknown access point {id}");
        };

        debug!(access_point = %id, %bound, "Ingress resolved");
        record.bound = Some(bound);
        record.bound_hash = Some(hash);
        record.lifecycle = AccessPointLifecycle::Ready;
        txn.put_access_point(record)?;
        txn.commit()
    }

    async fn delete(&self, key: &StateKey, _kind: ObjectKind) -> eyre::Result<()> {
        if key.namespace() != Some(KeyNamespace::Access) {
            eyre::bail!("controller does not materialize {key}");
        }
        let Some(id) = key.access_point() else {
            eyre::bail!("malformed access key {key}");
        };

        let mut txn = self.store.begin();
        let Some(mut record) = txn.access_point(&id)? else {
            // the whole access point is already gone; nothing to retract
            return Ok(());
        };

        debug!(access_point = %id, "Ingress retracted");
        record.bound = None;
        record.bound_hash = None;
        record.lifecycle = AccessPointLifecycle::New;
        txn.put_access_point(record)?;
        txn.commit()
    }

    async fn load(
        &self,
        key: &StateKey,
        _kind: ObjectKind,
    ) -> eyre::Result<Option<(StateObject, ContentHash)>> {
        if key.namespace() != Some(KeyNamespace::Access) {
            return Ok(None);
        }
        let Some(id) = key.access_point() else {
            return Ok(None);
        };

        let txn = self.store.begin();
        let Some(record) = txn.access_point(&id)? else {
            return Ok(None);
        };

        Ok(match (record.bound, record.bound_hash) {
            (Some(bound), Some(hash)) => Some((ingress_facts(&bound), hash)),
            _ => None,
        })
    }

    async fn list(&self) -> eyre::Result<Vec<(StateKey, ContentHash)>> {
        let txn = self.store.begin();

        Ok(txn
            .access_points()?
            .into_iter()
            .filter_map(|record| {
                record
                    .bound_hash
                    .map(|hash| (StateKey::access(&record.id), hash))
            })
            .collect())
    }
}
