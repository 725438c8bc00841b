//! End-to-end resolution and reconciliation tests
//!
//! These tests drive the crate through its public surface the way a serving
//! layer would: informer-style store population, per-request resolution, and
//! the reconciler lifecycle from sync-target churn to shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion, CustomResourceValidation, JSONSchemaProps,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::watch;

use trellis::apis::{
    APIBinding, APIBindingSpec, APIBindingStatus, APIExport, APIExportSpec, APIExportStatus,
    APIResourceSchema, APIResourceSchemaSpec, APIResourceVersion, BoundAPIResource,
    BoundSchemaReference, ClusterWorkspace, ClusterWorkspaceSpec, Condition, ExportReference,
    ResourceNames, ResourceToSync, SyncTarget, SyncTargetSpec, SyncTargetStatus, WorkspaceType,
    IDENTITY_ANNOTATION, INITIAL_BINDING_COMPLETED,
};
use trellis::cluster::{ClusterAwareKey, LogicalClusterName};
use trellis::controller::{
    ApiDefinition, ApiDefinitionFactory, ApiDomainKey, ApiDomainRegistry, ApiReconciler,
    GroupVersionResource, ReconcilerConfig,
};
use trellis::request::{LabelSelector, RequestContext};
use trellis::resolver::{
    BindingAwareCrdResolver, FeatureGates, SystemCrdGetter, SystemCrdRegistry, WorkspaceGetter,
};
use trellis::store::{
    BindingStore, CrdStore, ExportStore, SchemaStore, SyncTargetStore, WorkspaceStore,
};
use trellis::Error;

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
            versions: vec![CustomResourceDefinitionVersion {
                name: "v1".to_string(),
                served: true,
                storage: true,
                schema: Some(CustomResourceValidation {
                    open_api_v3_schema: Some(JSONSchemaProps {
                        type_: Some("object".to_string()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }],
            ..Default::default()
        },
        status: None,
    }
}

struct Environment {
    crds: Arc<CrdStore>,
    bindings: Arc<BindingStore>,
    workspaces: Arc<WorkspaceStore>,
    resolver: BindingAwareCrdResolver,
}

impl Environment {
    fn new() -> Self {
        let crds = Arc::new(CrdStore::new());
        let bindings = Arc::new(BindingStore::new());
        let workspaces = Arc::new(WorkspaceStore::new());
        let system = Arc::new(SystemCrdRegistry::new(
            FeatureGates::default(),
            workspaces.clone() as Arc<dyn WorkspaceGetter>,
            crds.clone() as Arc<dyn SystemCrdGetter>,
        ));
        let resolver = BindingAwareCrdResolver::new(system, crds.clone(), bindings.clone());
        Self {
            crds,
            bindings,
            workspaces,
            resolver,
        }
    }
}

#[tokio::test]
async fn a_workspace_sees_system_binding_and_local_crds_in_that_order() {
    let env = Environment::new();
    let team = LogicalClusterName::new("root:org:team");

    // The org tree exists and team is a Team workspace.
    env.workspaces.insert(
        LogicalClusterName::new("root:org"),
        ClusterWorkspace::new(
            "team",
            ClusterWorkspaceSpec {
                type_: WorkspaceType::new("Team"),
            },
        ),
    );

    // System CRDs live in the reserved system workspace.
    for name in [
        "clusterworkspaces.tenancy.kcp.dev",
        "clusterworkspacetypes.tenancy.kcp.dev",
        "clusterworkspaceshards.tenancy.kcp.dev",
        "workspaces.tenancy.kcp.dev",
    ] {
        let (resource, group) = name.split_once('.').unwrap();
        env.crds
            .insert(LogicalClusterName::system_crds(), crd(name, group, resource));
    }

    // A completed binding imports widgets.example.io; a local CRD of the
    // same name also exists and must lose.
    env.crds.insert(
        LogicalClusterName::bound_crds(),
        crd("bound-uid-1", "example.io", "widgets"),
    );
    env.crds
        .insert(team.clone(), crd("widgets.example.io", "example.io", "widgets"));
    let mut binding = APIBinding::new("example", APIBindingSpec::default());
    binding.status = Some(APIBindingStatus {
        bound_resources: vec![BoundAPIResource {
            group: "example.io".to_string(),
            resource: "widgets".to_string(),
            schema: BoundSchemaReference {
                name: "v1.widgets.example.io".to_string(),
                uid: "bound-uid-1".to_string(),
                identity_hash: "id-widgets".to_string(),
            },
        }],
        conditions: vec![Condition::true_(INITIAL_BINDING_COMPLETED)],
    });
    env.bindings.insert(team.clone(), binding);

    let ctx = RequestContext::new(team);
    let listed = env
        .resolver
        .list(&ctx, &LabelSelector::everything())
        .await
        .unwrap();

    // 4 system CRDs + 1 widgets (from the binding, not the local copy).
    assert_eq!(listed.len(), 5);
    let widgets: Vec<_> = listed
        .iter()
        .filter(|crd| crd.spec.names.plural == "widgets")
        .collect();
    assert_eq!(widgets.len(), 1);
    assert_eq!(
        widgets[0]
            .metadata
            .annotations
            .as_ref()
            .unwrap()
            .get(IDENTITY_ANNOTATION),
        Some(&"id-widgets".to_string())
    );

    // Get agrees with List.
    let served = env.resolver.get(&ctx, "widgets.example.io").await.unwrap();
    assert_eq!(served.metadata.name.as_deref(), Some("bound-uid-1"));
}

#[tokio::test]
async fn wildcard_reads_gate_on_schema_agreement_unless_projected() {
    let env = Environment::new();

    let mut variant = crd("widgets.example.io", "example.io", "widgets");
    variant.spec.versions[0].name = "v2".to_string();
    env.crds.insert(
        LogicalClusterName::new("root:a"),
        crd("widgets.example.io", "example.io", "widgets"),
    );
    env.crds.insert(LogicalClusterName::new("root:b"), variant);

    let err = env
        .resolver
        .get(&RequestContext::new(LogicalClusterName::wildcard()), "widgets.example.io")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let projected = env
        .resolver
        .get(
            &RequestContext::new(LogicalClusterName::wildcard())
                .with_accept("application/json;as=PartialObjectMetadataList;g=meta.k8s.io;v=v1"),
            "widgets.example.io",
        )
        .await
        .unwrap();
    assert_eq!(
        projected.metadata.uid.as_deref(),
        Some("widgets.example.io.wildcard.partial-metadata")
    );

    // The projection survives a refresh.
    let refreshed = env.resolver.refresh(&projected).unwrap();
    assert_eq!(refreshed.metadata.uid, projected.metadata.uid);
}

struct RecordingFactory {
    teardowns: Mutex<HashMap<String, Arc<AtomicUsize>>>,
}

struct RecordingDefinition {
    torn: Arc<AtomicUsize>,
}

impl ApiDefinition for RecordingDefinition {
    fn tear_down(&self) {
        self.torn.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApiDefinitionFactory for RecordingFactory {
    async fn create_api_definition(
        &self,
        _workspace: &LogicalClusterName,
        _sync_target_name: &str,
        schema: &APIResourceSchema,
        version: &str,
        _identity_hash: &str,
    ) -> Result<Arc<dyn ApiDefinition>, Error> {
        let label = format!("{}/{version}", schema.metadata.name.as_deref().unwrap_or(""));
        let torn = self
            .teardowns
            .lock()
            .unwrap()
            .entry(label)
            .or_default()
            .clone();
        Ok(Arc::new(RecordingDefinition { torn }))
    }
}

#[tokio::test(start_paused = true)]
async fn the_reconciler_keeps_the_registry_in_step_with_sync_targets() {
    let providers = LogicalClusterName::new("root:providers");
    let workloads = LogicalClusterName::new("root:workloads");

    let sync_targets = Arc::new(SyncTargetStore::new());
    let exports = Arc::new(ExportStore::new());
    let schemas = Arc::new(SchemaStore::new());
    let factory = Arc::new(RecordingFactory {
        teardowns: Mutex::new(HashMap::new()),
    });
    let reconciler = ApiReconciler::new(
        sync_targets.clone(),
        exports.clone(),
        schemas.clone(),
        factory.clone(),
        Arc::new(ApiDomainRegistry::new()),
    );

    schemas.insert(
        providers.clone(),
        APIResourceSchema::new(
            "v1.topics.kafka.io",
            APIResourceSchemaSpec {
                group: "kafka.io".to_string(),
                names: ResourceNames {
                    plural: "topics".to_string(),
                    kind: "Topic".to_string(),
                    ..Default::default()
                },
                versions: vec![APIResourceVersion {
                    name: "v1".to_string(),
                    served: true,
                    storage: true,
                    schema: None,
                }],
            },
        ),
    );
    let mut export = APIExport::new(
        "kafka",
        APIExportSpec {
            latest_resource_schemas: vec!["v1.topics.kafka.io".to_string()],
        },
    );
    export.status = Some(APIExportStatus {
        identity_hash: Some("id-kafka".to_string()),
        conditions: vec![],
    });
    exports.insert(providers.clone(), export);

    let mut target = SyncTarget::new(
        "us-east1",
        SyncTargetSpec {
            supported_api_exports: vec![ExportReference::new("root:providers", "kafka")],
        },
    );
    target.status = Some(SyncTargetStatus {
        synced_resources: vec![ResourceToSync {
            group: "kafka.io".to_string(),
            resource: "topics".to_string(),
            versions: vec!["v1".to_string()],
            identity_hash: "id-kafka".to_string(),
        }],
        conditions: vec![],
    });
    sync_targets.insert(workloads.clone(), target.clone());
    reconciler.sync_target_added(&workloads, &target);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(reconciler.clone().run(ReconcilerConfig::default(), shutdown_rx));

    let domain_key = ApiDomainKey::from_sync_target(&workloads, "us-east1");
    for _ in 0..100 {
        if reconciler.registry().get(&domain_key).is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let set = reconciler.registry().get(&domain_key).unwrap();
    assert!(set.contains_key(&GroupVersionResource::new("kafka.io", "v1", "topics")));

    // Deleting the sync target evicts its domain.
    sync_targets.remove(&workloads, "us-east1");
    reconciler.sync_target_deleted(&workloads, &target);
    for _ in 0..100 {
        if reconciler.registry().get(&domain_key).is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(reconciler.registry().get(&domain_key).is_none());

    shutdown_tx.send(true).unwrap();
    run.await.unwrap();

    // The single definition ever created was torn down exactly once.
    let teardowns = factory.teardowns.lock().unwrap();
    assert_eq!(teardowns.len(), 1);
    assert_eq!(
        teardowns["v1.topics.kafka.io/v1"].load(Ordering::SeqCst),
        1
    );

    // After the eviction the queue key is also gone from the sync target
    // store, so a late lookup through the registry reads as absent.
    assert!(sync_targets
        .get(&ClusterAwareKey::new(workloads, "us-east1"))
        .is_none());
}
