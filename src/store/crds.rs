//! Indexed cache of CustomResourceDefinitions
//!
//! Holds every CRD the server knows about, across all logical clusters,
//! including the shadow residents that back bound resources. Two secondary
//! indexes serve the resolver: per-workspace listing (which deliberately
//! excludes the shadow workspace, bound CRDs are never listed in any
//! workspace directly) and the global group-resource-name index used by
//! wildcard reads (which includes shadow and non-shadow residents alike).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::warn;

use crate::cluster::{ClusterAwareKey, LogicalClusterName, CLUSTER_ANNOTATION};

/// Derive the CRD's resolution name, `plural.group`
///
/// The core group is the empty string and is encoded as the plural alone.
/// This is derived from the spec, not from `metadata.name`: shadow residents
/// are named by schema UID but still resolve under their real name.
pub fn crd_group_resource_name(crd: &CustomResourceDefinition) -> String {
    if crd.spec.group.is_empty() {
        crd.spec.names.plural.clone()
    } else {
        format!("{}.{}", crd.spec.names.plural, crd.spec.group)
    }
}

#[derive(Default)]
struct Inner {
    by_key: HashMap<ClusterAwareKey, Arc<CustomResourceDefinition>>,
    by_workspace: HashMap<LogicalClusterName, BTreeSet<ClusterAwareKey>>,
    by_group_resource_name: HashMap<String, BTreeSet<ClusterAwareKey>>,
}

impl Inner {
    fn unlink(&mut self, key: &ClusterAwareKey) {
        let Some(old) = self.by_key.remove(key) else {
            return;
        };
        if let Some(keys) = self.by_workspace.get_mut(&key.cluster) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_workspace.remove(&key.cluster);
            }
        }
        let name = crd_group_resource_name(&old);
        if let Some(keys) = self.by_group_resource_name.get_mut(&name) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_group_resource_name.remove(&name);
            }
        }
    }
}

/// Indexed cache of CustomResourceDefinitions across all logical clusters
#[derive(Default)]
pub struct CrdStore {
    inner: RwLock<Inner>,
}

impl CrdStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a CRD residing in `cluster`
    ///
    /// The object's cluster annotation is stamped so its residence can be
    /// recovered later (e.g. by `Refresh`).
    pub fn insert(&self, cluster: LogicalClusterName, mut crd: CustomResourceDefinition) {
        let Some(name) = crd.metadata.name.clone() else {
            warn!(cluster = %cluster, "dropping CRD without a name");
            return;
        };

        crd.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(CLUSTER_ANNOTATION.to_string(), cluster.as_str().to_string());

        let key = ClusterAwareKey::new(cluster, name);
        let resolution_name = crd_group_resource_name(&crd);

        let mut inner = self.inner.write().expect("crd store lock poisoned");
        inner.unlink(&key);
        if key.cluster != LogicalClusterName::bound_crds() {
            inner
                .by_workspace
                .entry(key.cluster.clone())
                .or_default()
                .insert(key.clone());
        }
        inner
            .by_group_resource_name
            .entry(resolution_name)
            .or_default()
            .insert(key.clone());
        inner.by_key.insert(key, Arc::new(crd));
    }

    /// Remove the CRD named `name` from `cluster`, if present
    pub fn remove(&self, cluster: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(cluster.clone(), name);
        let mut inner = self.inner.write().expect("crd store lock poisoned");
        inner.unlink(&key);
    }

    /// Fetch a CRD by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<CustomResourceDefinition>> {
        let inner = self.inner.read().expect("crd store lock poisoned");
        inner.by_key.get(key).cloned()
    }

    /// All CRDs residing in `cluster`, excluding shadow residents
    pub fn list_workspace(
        &self,
        cluster: &LogicalClusterName,
    ) -> Vec<Arc<CustomResourceDefinition>> {
        let inner = self.inner.read().expect("crd store lock poisoned");
        inner
            .by_workspace
            .get(cluster)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.by_key.get(key).cloned())
            .collect()
    }

    /// All CRDs anywhere whose resolution name is `name`
    ///
    /// Iteration order is deterministic (sorted by cluster-aware key), so
    /// "first match wins" reads are stable across calls.
    pub fn list_by_group_resource_name(&self, name: &str) -> Vec<Arc<CustomResourceDefinition>> {
        let inner = self.inner.read().expect("crd store lock poisoned");
        inner
            .by_group_resource_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.by_key.get(key).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn crd(name: &str, group: &str, plural: &str) -> CustomResourceDefinition {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: CustomResourceDefinitionSpec {
                group: group.to_string(),
                names: CustomResourceDefinitionNames {
                    plural: plural.to_string(),
                    kind: "Widget".to_string(),
                    ..Default::default()
                },
                scope: "Cluster".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn resolution_name_encodes_the_core_group_as_plural_alone() {
        assert_eq!(
            crd_group_resource_name(&crd("widgets.example.io", "example.io", "widgets")),
            "widgets.example.io"
        );
        assert_eq!(crd_group_resource_name(&crd("pods", "", "pods")), "pods");
    }

    #[test]
    fn insert_stamps_the_cluster_annotation() {
        let store = CrdStore::new();
        let cluster = LogicalClusterName::new("root:org");
        store.insert(cluster.clone(), crd("widgets.example.io", "example.io", "widgets"));

        let key = ClusterAwareKey::new(cluster, "widgets.example.io");
        let cached = store.get(&key).unwrap();
        assert_eq!(
            LogicalClusterName::from_meta(&cached.metadata),
            Some(LogicalClusterName::new("root:org"))
        );
    }

    #[test]
    fn workspace_listing_excludes_shadow_residents() {
        let store = CrdStore::new();
        store.insert(
            LogicalClusterName::new("root:org"),
            crd("widgets.example.io", "example.io", "widgets"),
        );
        store.insert(
            LogicalClusterName::bound_crds(),
            crd("abc-123", "example.io", "widgets"),
        );

        assert_eq!(store.list_workspace(&LogicalClusterName::new("root:org")).len(), 1);
        assert!(store.list_workspace(&LogicalClusterName::bound_crds()).is_empty());

        // ... but the shadow resident is still reachable by key and by
        // resolution name.
        let shadow_key = ClusterAwareKey::new(LogicalClusterName::bound_crds(), "abc-123");
        assert!(store.get(&shadow_key).is_some());
        assert_eq!(store.list_by_group_resource_name("widgets.example.io").len(), 2);
    }

    #[test]
    fn reinsert_relinks_the_group_resource_index() {
        let store = CrdStore::new();
        let cluster = LogicalClusterName::new("root:org");
        store.insert(cluster.clone(), crd("widgets.example.io", "example.io", "widgets"));

        // Same key, different spec: the old index entry must not linger.
        store.insert(cluster.clone(), crd("widgets.example.io", "example.io", "gadgets"));

        assert!(store.list_by_group_resource_name("widgets.example.io").is_empty());
        assert_eq!(store.list_by_group_resource_name("gadgets.example.io").len(), 1);
    }

    #[test]
    fn remove_clears_every_index() {
        let store = CrdStore::new();
        let cluster = LogicalClusterName::new("root:org");
        store.insert(cluster.clone(), crd("widgets.example.io", "example.io", "widgets"));
        store.remove(&cluster, "widgets.example.io");

        assert!(store.get(&ClusterAwareKey::new(cluster.clone(), "widgets.example.io")).is_none());
        assert!(store.list_workspace(&cluster).is_empty());
        assert!(store.list_by_group_resource_name("widgets.example.io").is_empty());
    }
}
