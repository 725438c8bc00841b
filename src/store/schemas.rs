//! Indexed cache of APIResourceSchemas

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::apis::APIResourceSchema;
use crate::cluster::{ClusterAwareKey, LogicalClusterName};

/// Indexed cache of APIResourceSchemas across all logical clusters
#[derive(Default)]
pub struct SchemaStore {
    by_key: RwLock<HashMap<ClusterAwareKey, Arc<APIResourceSchema>>>,
}

impl SchemaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a schema residing in `cluster`
    pub fn insert(&self, cluster: LogicalClusterName, schema: APIResourceSchema) {
        let Some(name) = schema.metadata.name.clone() else {
            warn!(cluster = %cluster, "dropping APIResourceSchema without a name");
            return;
        };
        let key = ClusterAwareKey::new(cluster, name);
        self.by_key
            .write()
            .expect("schema store lock poisoned")
            .insert(key, Arc::new(schema));
    }

    /// Remove the schema named `name` from `cluster`, if present
    pub fn remove(&self, cluster: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(cluster.clone(), name);
        self.by_key
            .write()
            .expect("schema store lock poisoned")
            .remove(&key);
    }

    /// Fetch a schema by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<APIResourceSchema>> {
        self.by_key
            .read()
            .expect("schema store lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::APIResourceSchemaSpec;

    #[test]
    fn schemas_are_keyed_by_cluster_and_name() {
        let store = SchemaStore::new();
        let cluster = LogicalClusterName::new("root:providers");
        store.insert(
            cluster.clone(),
            APIResourceSchema::new("v1.topics.kafka.io", APIResourceSchemaSpec::default()),
        );

        let key = ClusterAwareKey::new(cluster.clone(), "v1.topics.kafka.io");
        assert!(store.get(&key).is_some());

        let elsewhere = ClusterAwareKey::new(LogicalClusterName::new("root:other"), "v1.topics.kafka.io");
        assert!(store.get(&elsewhere).is_none());

        store.remove(&cluster, "v1.topics.kafka.io");
        assert!(store.get(&key).is_none());
    }
}
