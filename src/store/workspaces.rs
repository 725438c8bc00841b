//! Indexed cache of ClusterWorkspaces
//!
//! A workspace object for logical cluster `root:org:team` resides in its
//! parent cluster `root:org` under the name `team`; keys here follow that
//! convention.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::apis::ClusterWorkspace;
use crate::cluster::{ClusterAwareKey, LogicalClusterName};

/// Indexed cache of ClusterWorkspaces, keyed by `(parent, name)`
#[derive(Default)]
pub struct WorkspaceStore {
    by_key: RwLock<HashMap<ClusterAwareKey, Arc<ClusterWorkspace>>>,
}

impl WorkspaceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workspace residing in `parent`
    pub fn insert(&self, parent: LogicalClusterName, workspace: ClusterWorkspace) {
        let Some(name) = workspace.metadata.name.clone() else {
            warn!(cluster = %parent, "dropping ClusterWorkspace without a name");
            return;
        };
        let key = ClusterAwareKey::new(parent, name);
        self.by_key
            .write()
            .expect("workspace store lock poisoned")
            .insert(key, Arc::new(workspace));
    }

    /// Remove the workspace named `name` from `parent`, if present
    pub fn remove(&self, parent: &LogicalClusterName, name: &str) {
        let key = ClusterAwareKey::new(parent.clone(), name);
        self.by_key
            .write()
            .expect("workspace store lock poisoned")
            .remove(&key);
    }

    /// Fetch a workspace by its cluster-aware key
    pub fn get(&self, key: &ClusterAwareKey) -> Option<Arc<ClusterWorkspace>> {
        self.by_key
            .read()
            .expect("workspace store lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{ClusterWorkspaceSpec, WorkspaceType};

    fn workspace(name: &str, type_: &str) -> ClusterWorkspace {
        ClusterWorkspace::new(
            name,
            ClusterWorkspaceSpec {
                type_: WorkspaceType::new(type_),
            },
        )
    }

    #[test]
    fn workspaces_are_keyed_by_parent_and_name() {
        let store = WorkspaceStore::new();
        store.insert(LogicalClusterName::root(), workspace("org", "Organization"));

        let key = ClusterAwareKey::new(LogicalClusterName::root(), "org");
        assert_eq!(
            store.get(&key).unwrap().spec.type_,
            WorkspaceType::new("Organization")
        );

        // The same name under a different parent is a different workspace.
        let other = ClusterAwareKey::new(LogicalClusterName::new("root:other"), "org");
        assert!(store.get(&other).is_none());

        store.remove(&LogicalClusterName::root(), "org");
        assert!(store.get(&key).is_none());
    }
}
