//! API reconciler
//!
//! Watches SyncTarget, APIExport and APIResourceSchema event streams and
//! maintains, per API domain, the set of live API definitions the serving
//! layer dispatches to. The work unit is a sync target key; export and
//! schema events fan out to the sync targets consuming them through the
//! store indexes. Consumers get eventual consistency: the registry may lag
//! the caches by one reconcile cycle, and a missing kind is a 404 that later
//! succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::apis::{APIExport, APIResourceSchema, ResourceToSync, SyncTarget};
use crate::cluster::{ClusterAwareKey, LogicalClusterName};
use crate::store::{export_keys, ExportStore, SchemaStore, SyncTargetStore};
use crate::Result;

use super::definition::{
    ApiDefinitionEntry, ApiDefinitionFactory, ApiDefinitionSet, ApiDomainKey, GroupVersionResource,
};
use super::queue::RateLimitingQueue;
use super::registry::ApiDomainRegistry;

/// Configuration for the reconciler's worker pool
#[derive(Clone, Copy, Debug)]
pub struct ReconcilerConfig {
    /// Number of concurrent workers; different keys proceed in parallel up
    /// to this count
    pub workers: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

/// Controller maintaining per-API-domain definition sets
pub struct ApiReconciler {
    sync_targets: Arc<SyncTargetStore>,
    exports: Arc<ExportStore>,
    schemas: Arc<SchemaStore>,

    factory: Arc<dyn ApiDefinitionFactory>,
    registry: Arc<ApiDomainRegistry>,

    queue: Arc<RateLimitingQueue<ClusterAwareKey>>,
}

impl ApiReconciler {
    /// Create a reconciler over the given stores, publishing to `registry`
    pub fn new(
        sync_targets: Arc<SyncTargetStore>,
        exports: Arc<ExportStore>,
        schemas: Arc<SchemaStore>,
        factory: Arc<dyn ApiDefinitionFactory>,
        registry: Arc<ApiDomainRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sync_targets,
            exports,
            schemas,
            factory,
            registry,
            queue: RateLimitingQueue::new(),
        })
    }

    /// The registry this reconciler publishes to
    pub fn registry(&self) -> &Arc<ApiDomainRegistry> {
        &self.registry
    }

    /// Handle a sync target appearing in `cluster`
    pub fn sync_target_added(&self, cluster: &LogicalClusterName, target: &SyncTarget) {
        self.enqueue_sync_target(cluster, target);
    }

    /// Handle a sync target update
    ///
    /// Only updates that actually changed `status.syncedResources` produce
    /// work; everything else about a sync target is irrelevant here.
    pub fn sync_target_updated(
        &self,
        cluster: &LogicalClusterName,
        old: &SyncTarget,
        new: &SyncTarget,
    ) {
        if old.synced_resources() == new.synced_resources() {
            return;
        }
        self.enqueue_sync_target(cluster, new);
    }

    /// Handle a sync target deletion
    pub fn sync_target_deleted(&self, cluster: &LogicalClusterName, target: &SyncTarget) {
        self.enqueue_sync_target(cluster, target);
    }

    /// Handle any APIExport event, fanning out to referencing sync targets
    pub fn api_export_changed(&self, cluster: &LogicalClusterName, export: &APIExport) {
        let Some(name) = export.metadata.name.as_deref() else {
            return;
        };
        let export_key = ClusterAwareKey::new(cluster.clone(), name);
        for target_key in self.sync_targets.keys_by_export(&export_key) {
            debug!(key = %target_key, export = %export_key, "queueing SyncTarget because of APIExport");
            self.queue.add(target_key);
        }
    }

    /// Handle any APIResourceSchema event, fanning out through the exports
    /// listing it
    pub fn api_resource_schema_changed(
        &self,
        cluster: &LogicalClusterName,
        schema: &APIResourceSchema,
    ) {
        let Some(name) = schema.metadata.name.as_deref() else {
            return;
        };
        let schema_key = ClusterAwareKey::new(cluster.clone(), name);
        for export in self.exports.list_by_resource_schema(&schema_key) {
            // An export listing this schema resides in the schema's cluster.
            debug!(schema = %schema_key, "queueing APIExport because of APIResourceSchema");
            self.api_export_changed(&schema_key.cluster, &export);
        }
    }

    fn enqueue_sync_target(&self, cluster: &LogicalClusterName, target: &SyncTarget) {
        let Some(name) = target.metadata.name.as_deref() else {
            return;
        };
        let key = ClusterAwareKey::new(cluster.clone(), name);
        debug!(key = %key, "queueing SyncTarget");
        self.queue.add(key);
    }

    /// Run workers until `shutdown` fires, then drain and tear down
    ///
    /// On shutdown the queue stops accepting work, the workers drain what is
    /// already queued, and every definition still held by the registry is
    /// torn down exactly once.
    pub async fn run(self: Arc<Self>, config: ReconcilerConfig, mut shutdown: watch::Receiver<bool>) {
        let workers = config.workers.max(1);
        info!(workers, "starting api reconciler");

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let reconciler = Arc::clone(&self);
            handles.push(tokio::spawn(async move { reconciler.worker().await }));
        }

        // A dropped sender also reads as shutdown.
        let _ = shutdown.wait_for(|stop| *stop).await;

        self.queue.shut_down();
        for handle in handles {
            let _ = handle.await;
        }

        self.tear_down_all();
        info!("api reconciler stopped");
    }

    async fn worker(self: Arc<Self>) {
        while let Some(key) = self.queue.get().await {
            if let Err(err) = self.process(&key).await {
                error!(key = %key, error = %err, "failed to sync SyncTarget; requeuing");
                self.queue.clone().add_rate_limited(key.clone());
            } else {
                self.queue.forget(&key);
            }
            self.queue.done(&key);
        }
    }

    async fn process(&self, key: &ClusterAwareKey) -> Result<()> {
        let domain_key = ApiDomainKey::from_sync_target(&key.cluster, &key.name);

        let Some(target) = self.sync_targets.get(key) else {
            self.remove_api_definition_set(&domain_key);
            return Ok(());
        };

        self.reconcile(&domain_key, key, &target).await
    }

    async fn reconcile(
        &self,
        domain_key: &ApiDomainKey,
        target_key: &ClusterAwareKey,
        target: &SyncTarget,
    ) -> Result<()> {
        let desired = self.desired_schemas(target_key, target);

        let current = self.registry.get(domain_key).unwrap_or_default();

        let mut next = ApiDefinitionSet::new();
        let mut removed: Vec<ApiDefinitionEntry> = Vec::new();
        for (gvr, entry) in current.iter() {
            let keep = desired.get(gvr).is_some_and(|(schema, identity)| {
                entry.schema_uid == schema_uid(schema) && entry.identity_hash == *identity
            });
            if keep {
                next.insert(gvr.clone(), entry.clone());
            } else {
                removed.push(entry.clone());
            }
        }

        let mut fresh: Vec<GroupVersionResource> = Vec::new();
        for (gvr, (schema, identity)) in &desired {
            if next.contains_key(gvr) {
                continue;
            }
            let definition = match self
                .factory
                .create_api_definition(
                    &target_key.cluster,
                    &target_key.name,
                    schema,
                    &gvr.version,
                    identity,
                )
                .await
            {
                Ok(definition) => definition,
                Err(err) => {
                    // Abort without publishing: definitions created in this
                    // attempt would otherwise leak, so release them now. The
                    // kept entries stay live in the currently published set.
                    for gvr in &fresh {
                        if let Some(entry) = next.get(gvr) {
                            entry.definition.tear_down();
                        }
                    }
                    return Err(err);
                }
            };
            next.insert(
                gvr.clone(),
                ApiDefinitionEntry {
                    schema_uid: schema_uid(schema),
                    identity_hash: identity.clone(),
                    definition,
                },
            );
            fresh.push(gvr.clone());
        }

        debug!(
            key = %domain_key,
            definitions = next.len(),
            removed = removed.len(),
            "publishing api definition set"
        );
        self.registry.publish(domain_key.clone(), Arc::new(next));

        for entry in removed {
            entry.definition.tear_down();
        }

        Ok(())
    }

    /// Resolve the sync target's synced resources to concrete schemas
    ///
    /// A synced resource whose schema cannot be found through the target's
    /// exports is skipped: the schema event that makes it resolvable will
    /// re-enqueue this target.
    fn desired_schemas(
        &self,
        target_key: &ClusterAwareKey,
        target: &SyncTarget,
    ) -> HashMap<GroupVersionResource, (Arc<APIResourceSchema>, String)> {
        let mut desired = HashMap::new();

        for synced in target.synced_resources() {
            let Some(schema) = self.find_schema(target_key, target, synced) else {
                warn!(
                    key = %target_key,
                    group = %synced.group,
                    resource = %synced.resource,
                    "no schema found for synced resource through the target's exports"
                );
                continue;
            };

            for version in &synced.versions {
                if !schema.serves_version(version) {
                    continue;
                }
                desired.insert(
                    GroupVersionResource::new(
                        synced.group.clone(),
                        version.clone(),
                        synced.resource.clone(),
                    ),
                    (schema.clone(), synced.identity_hash.clone()),
                );
            }
        }

        desired
    }

    fn find_schema(
        &self,
        target_key: &ClusterAwareKey,
        target: &SyncTarget,
        synced: &ResourceToSync,
    ) -> Option<Arc<APIResourceSchema>> {
        for export_key in export_keys(target_key, target) {
            let Some(export) = self.exports.get(&export_key) else {
                continue;
            };
            if !synced.identity_hash.is_empty() && export.identity_hash() != synced.identity_hash {
                continue;
            }
            for schema_name in &export.spec.latest_resource_schemas {
                let schema_key =
                    ClusterAwareKey::new(export_key.cluster.clone(), schema_name.clone());
                let Some(schema) = self.schemas.get(&schema_key) else {
                    continue;
                };
                if schema.defines(&synced.group, &synced.resource) {
                    return Some(schema);
                }
            }
        }
        None
    }

    fn remove_api_definition_set(&self, key: &ApiDomainKey) {
        let Some(set) = self.registry.remove(key) else {
            return;
        };
        info!(key = %key, definitions = set.len(), "removing api definition set");
        for entry in set.values() {
            entry.definition.tear_down();
        }
    }

    fn tear_down_all(&self) {
        for set in self.registry.drain() {
            for entry in set.values() {
                entry.definition.tear_down();
            }
        }
    }
}

fn schema_uid(schema: &APIResourceSchema) -> String {
    schema
        .metadata
        .uid
        .clone()
        .or_else(|| schema.metadata.name.clone())
        .unwrap_or_default()
}
