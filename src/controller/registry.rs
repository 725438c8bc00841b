//! Registry of live API definition sets
//!
//! Concurrent map from API domain key to the set of definitions serving that
//! domain. Single writer (the reconciler), many readers (the serving layer).
//! Readers get a snapshot pointer; writers hold the lock only while swapping
//! pointers. The registry owns nothing beyond the map: tearing definitions
//! down is the writer's job at eviction and shutdown.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::definition::{ApiDefinitionSet, ApiDomainKey};

/// Concurrent map from API domain key to its live definition set
#[derive(Default)]
pub struct ApiDomainRegistry {
    api_sets: RwLock<HashMap<ApiDomainKey, Arc<ApiDefinitionSet>>>,
}

impl ApiDomainRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the definition set for `key`, if one is published
    ///
    /// The snapshot stays valid while the reconciler publishes newer sets;
    /// readers are never blocked by a swap.
    pub fn get(&self, key: &ApiDomainKey) -> Option<Arc<ApiDefinitionSet>> {
        self.api_sets
            .read()
            .expect("api domain registry lock poisoned")
            .get(key)
            .cloned()
    }

    /// Publish `set` as the current definitions for `key`
    pub(crate) fn publish(&self, key: ApiDomainKey, set: Arc<ApiDefinitionSet>) {
        self.api_sets
            .write()
            .expect("api domain registry lock poisoned")
            .insert(key, set);
    }

    /// Evict the definition set for `key`, returning it for teardown
    pub(crate) fn remove(&self, key: &ApiDomainKey) -> Option<Arc<ApiDefinitionSet>> {
        self.api_sets
            .write()
            .expect("api domain registry lock poisoned")
            .remove(key)
    }

    /// Evict every definition set, returning them for teardown
    pub(crate) fn drain(&self) -> Vec<Arc<ApiDefinitionSet>> {
        let mut api_sets = self
            .api_sets
            .write()
            .expect("api domain registry lock poisoned");
        api_sets.drain().map(|(_, set)| set).collect()
    }
}
