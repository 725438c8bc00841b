//! Indexed cache of SyncTargets
//!
//! The secondary index maps an APIExport (by cluster-aware key) to the sync
//! targets referencing it, the first hop of the reconciler's event fan-out.
//! An export reference with an empty path points at the sync target's own
//! workspace.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::apis::SyncTarget;
use crate::cluster::{ClusterAwareKey, LogicalClusterName};

#[derive(Default)]
struct Inner {
    by_key: HashMap<ClusterAwareKey, Arc<SyncTarget>>,
    by_export: HashMap<ClusterAwareKey, BTreeSet<ClusterAwareKey>>,
}

impl Inner {
    fn unlink(&mut self, key: &ClusterAwareKey) {
        let Some(old) = self.by_key.remove(key) else {
            return;
        };
        for export_key in export_keys(key, &old) {
            if let Some(keys) = self.by_export.get_mut(&export_key) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_export.remove(&export_key);
                }
            }
        }
    }
}

/// Export keys a sync target references, resolving empty paths to the
/// target's own cluster
pub(crate) fn export_keys(target_key: &ClusterAwareKey, target: &SyncTarget) -> Vec<ClusterAwareKey> {
    target
        .spec
        .supported_api_exports
        .iter()
        .map(|reference| {
            let cluster = if reference.path.is_empty() {
                target_key.cluster.clone()
            } else {
                LogicalClusterName::new(reference.path.clone())
            };
            ClusterAwareKey::new(cluster, reference.export_name.clone())
        })
        .collect()
}

/// Indexed cache of SyncTargets across all logical clusters
#[derive(Default)]
pub struct SyncTargetStore {
    inner: RwLock<Inner>,
}

impl SyncTargetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a sync target residing in `cluster`
    pub fn insert(&self, cluster: LogicalClusterName, target: SyncTarget) {
        let Some(name) = target.metadata.name.clone() else {
            warn!(cluster = %cluster, "dropping SyncTarget without a name");
            return;
        };
        let key = ClusterAwareKey::new(cluster, name);

        let mut inner = self.inner.write().expect("sync target store lock poisoned");
        inner.unlink(&key);
        for export_key in export_keys(&key, &target) {
            inner
                .by_export
                .entry(export_key)
                .or_default()
                .insert(key.clone());
        }
        inner.by_key.insert(key, Arc::new(target));
    }

    /// Remove the sync target named `name` from `cluster`, if present
    pub fn remove(&self, cluster: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(cluster.clone(), name);
        let mut inner = self.inner.write().expect("sync target store lock poisoned");
        inner.unlink(&key);
    }

    /// Fetch a sync target by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<SyncTarget>> {
        let inner = self.inner.read().expect("sync target store lock poisoned");
        inner.by_key.get(key).cloned()
    }

    /// Keys of all sync targets referencing the export at `export_key`
    pub fn keys_by_export(&self, export_key: &ClusterAwareKey) -> Vec<ClusterAwareKey> {
        let inner = self.inner.read().expect("sync target store lock poisoned");
        inner
            .by_export
            .get(export_key)
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}
