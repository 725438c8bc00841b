//! Indexed cache of APIBindings

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::apis::APIBinding;
use crate::cluster::{ClusterAwareKey, LogicalClusterName};

/// Index key for bindings that bound a `(identity, group, resource)` tuple
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityGroupResource {
    /// Identity hash of the export the resource was bound from
    pub identity: String,
    /// API group (empty for the core group)
    pub group: String,
    /// Plural resource name
    pub resource: String,
}

impl IdentityGroupResource {
    /// Create an index key
    pub fn new(
        identity: impl Into<String>,
        group: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            group: group.into(),
            resource: resource.into(),
        }
    }
}

#[derive(Default)]
struct Inner {
    by_key: HashMap<ClusterAwareKey, Arc<APIBinding>>,
    by_workspace: HashMap<LogicalClusterName, BTreeSet<ClusterAwareKey>>,
    by_identity_group_resource: HashMap<IdentityGroupResource, BTreeSet<ClusterAwareKey>>,
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
        for igr in index_tuples(&old) {
            if let Some(keys) = self.by_identity_group_resource.get_mut(&igr) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_identity_group_resource.remove(&igr);
                }
            }
        }
    }
}

fn index_tuples(binding: &APIBinding) -> Vec<IdentityGroupResource> {
    binding
        .bound_resources()
        .iter()
        .map(|bound| {
            IdentityGroupResource::new(
                bound.schema.identity_hash.clone(),
                bound.group.clone(),
                bound.resource.clone(),
            )
        })
        .collect()
}

/// Indexed cache of APIBindings across all logical clusters
#[derive(Default)]
pub struct BindingStore {
    inner: RwLock<Inner>,
}

impl BindingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a binding residing in `cluster`
    pub fn insert(&self, cluster: LogicalClusterName, binding: APIBinding) {
        let Some(name) = binding.metadata.name.clone() else {
            warn!(cluster = %cluster, "dropping APIBinding without a name");
            return;
        };
        let key = ClusterAwareKey::new(cluster, name);
        let tuples = index_tuples(&binding);

        let mut inner = self.inner.write().expect("binding store lock poisoned");
        inner.unlink(&key);
        inner
            .by_workspace
            .entry(key.cluster.clone())
            .or_default()
            .insert(key.clone());
        for igr in tuples {
            inner
                .by_identity_group_resource
                .entry(igr)
                .or_default()
                .insert(key.clone());
        }
        inner.by_key.insert(key, Arc::new(binding));
    }

    /// Remove the binding named `name` from `cluster`, if present
    pub fn remove(&self, cluster: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(cluster.clone(), name);
        let mut inner = self.inner.write().expect("binding store lock poisoned");
        inner.unlink(&key);
    }

    /// Fetch a binding by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<APIBinding>> {
        let inner = self.inner.read().expect("binding store lock poisoned");
        inner.by_key.get(key).cloned()
    }

    /// All bindings residing in `cluster`
    pub fn list_workspace(&self, cluster: &LogicalClusterName) -> Vec<Arc<APIBinding>> {
        let inner = self.inner.read().expect("binding store lock poisoned");
        inner
            .by_workspace
            .get(cluster)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.by_key.get(key).cloned())
            .collect()
    }

    /// All bindings that bound the given `(identity, group, resource)` tuple
    ///
    /// Deterministic order; callers that take the first match get a stable
    /// answer.
    pub fn list_by_identity_group_resource(
        &self,
        igr: &IdentityGroupResource,
    ) -> Vec<Arc<APIBinding>> {
        let inner = self.inner.read().expect("binding store lock poisoned");
        inner
            .by_identity_group_resource
            .get(igr)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.by_key.get(key).cloned())
            .collect()
    }
}
