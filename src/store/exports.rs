//! Indexed cache of APIExports
//!
//! The secondary index maps an APIResourceSchema (by cluster-aware key) to
//! the exports that currently list it; the reconciler uses it to fan schema
//! events out to the sync targets consuming them. An export's resource
//! schemas are names in the export's own workspace.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::apis::APIExport;
use crate::cluster::{ClusterAwareKey, LogicalClusterName};

#[derive(Default)]
struct Inner {
    by_key: HashMap<ClusterAwareKey, Arc<APIExport>>,
    by_resource_schema: HashMap<ClusterAwareKey, BTreeSet<ClusterAwareKey>>,
}

impl Inner {
    fn unlink(&mut self, key: &ClusterAwareKey) {
        let Some(old) = self.by_key.remove(key) else {
            return;
        };
        for schema_key in schema_keys(key, &old) {
            if let Some(keys) = self.by_resource_schema.get_mut(&schema_key) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_resource_schema.remove(&schema_key);
                }
            }
        }
    }
}

fn schema_keys(export_key: &ClusterAwareKey, export: &APIExport) -> Vec<ClusterAwareKey> {
    export
        .spec
        .latest_resource_schemas
        .iter()
        .map(|name| ClusterAwareKey::new(export_key.cluster.clone(), name.clone()))
        .collect()
}

/// Indexed cache of APIExports across all logical clusters
#[derive(Default)]
pub struct ExportStore {
    inner: RwLock<Inner>,
}

impl ExportStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an export residing in `cluster`
    pub fn insert(&self, cluster: LogicalClusterName, export: APIExport) {
        let Some(name) = export.metadata.name.clone() else {
            warn!(cluster = %cluster, "dropping APIExport without a name");
            return;
        };
        let key = ClusterAwareKey::new(cluster, name);

        let mut inner = self.inner.write().expect("export store lock poisoned");
        inner.unlink(&key);
        for schema_key in schema_keys(&key, &export) {
            inner
                .by_resource_schema
                .entry(schema_key)
                .or_default()
                .insert(key.clone());
        }
        inner.by_key.insert(key, Arc::new(export));
    }

    /// Remove the export named `name` from `cluster`, if present
    pub fn remove(&self, cluster: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(cluster.clone(), name);
        let mut inner = self.inner.write().expect("export store lock poisoned");
        inner.unlink(&key);
    }

    /// Fetch an export by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<APIExport>> {
        let inner = self.inner.read().expect("export store lock poisoned");
        inner.by_key.get(key).cloned()
    }

    /// All exports currently listing the schema at `schema_key`
    pub fn list_by_resource_schema(&self, schema_key: &ClusterAwareKey) -> Vec<Arc<APIExport>> {
        let inner = self.inner.read().expect("export store lock poisoned");
        inner
            .by_resource_schema
            .get(schema_key)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.by_key.get(key).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::APIExportSpec;

    fn export(name: &str, schemas: &[&str]) -> APIExport {
        APIExport::new(
            name,
            APIExportSpec {
                latest_resource_schemas: schemas.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    #[test]
    fn exports_index_by_their_resource_schemas() {
        let store = ExportStore::new();
        let cluster = LogicalClusterName::new("root:providers");
        store.insert(cluster.clone(), export("kafka", &["v1.topics.kafka.io"]));

        let schema_key = ClusterAwareKey::new(cluster.clone(), "v1.topics.kafka.io");
        assert_eq!(store.list_by_resource_schema(&schema_key).len(), 1);

        // Dropping the schema from the export drops the index entry.
        store.insert(cluster.clone(), export("kafka", &["v2.topics.kafka.io"]));
        assert!(store.list_by_resource_schema(&schema_key).is_empty());
    }

    #[test]
    fn exports_are_keyed_by_cluster_and_name() {
        let store = ExportStore::new();
        let cluster = LogicalClusterName::new("root:providers");
        store.insert(cluster.clone(), export("kafka", &[]));

        assert!(store.get(&ClusterAwareKey::new(cluster, "kafka")).is_some());
        assert!(store
            .get(&ClusterAwareKey::new(LogicalClusterName::new("root:elsewhere"), "kafka"))
            .is_none());
    }

    #[test]
    fn remove_clears_the_schema_index() {
        let store = ExportStore::new();
        let cluster = LogicalClusterName::new("root:providers");
        store.insert(cluster.clone(), export("kafka", &["v1.topics.kafka.io"]));
        store.remove(&cluster, "kafka");

        let schema_key = ClusterAwareKey::new(cluster, "v1.topics.kafka.io");
        assert!(store.list_by_resource_schema(&schema_key).is_empty());
    }
}
