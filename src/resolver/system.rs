//! System CRD registry
//!
//! A fixed set of CRDs is installed into the reserved `system:system-crds`
//! logical cluster and projected into workspaces by type: every workspace
//! under root sees the common set, and its workspace type adds the root, org
//! or universal set on top. The registry is built once at startup; feature
//! gates are evaluated at construction and add scheduling CRDs to the root,
//! org and universal sets simultaneously.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::error;

#[cfg(test)]
use mockall::automock;

use crate::apis::{ClusterWorkspace, WorkspaceType};
use crate::cluster::{ClusterAwareKey, LogicalClusterName};
use crate::error::Error;
use crate::store::{CrdStore, WorkspaceStore};
use crate::Result;

const COMMON_CRDS: &[&str] = &[
    "clusterworkspaces.tenancy.kcp.dev",
    "clusterworkspacetypes.tenancy.kcp.dev",
    "clusterworkspaceshards.tenancy.kcp.dev",
    // Installed for discovery and OpenAPI; served by a native rest storage
    // projecting the clusterworkspaces.
    "workspaces.tenancy.kcp.dev",
];

const UNIVERSAL_CRDS: &[&str] = &[
    "apiresourceimports.apiresource.kcp.dev",
    "negotiatedapiresources.apiresource.kcp.dev",
    "workloadclusters.workload.kcp.dev",
    "apiexports.apis.kcp.dev",
    "apibindings.apis.kcp.dev",
    "apiresourceschemas.apis.kcp.dev",
];

const LOCATIONS_CRD: &str = "locations.scheduling.kcp.dev";
const PLACEMENTS_CRD: &str = "placements.scheduling.kcp.dev";

/// Feature gates evaluated when the system registry is constructed
///
/// Hot-reload is not supported; a gate flip requires a restart.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeatureGates {
    /// Enables the Location scheduling API
    pub location_api: bool,
    /// Enables the Placement scheduling API
    pub placement_api: bool,
}

/// Lookup of ClusterWorkspaces by cluster-aware key
#[cfg_attr(test, automock)]
pub trait WorkspaceGetter: Send + Sync {
    /// Get the workspace at `key`, or a not-found error
    fn get_workspace(&self, key: &ClusterAwareKey) -> Result<Arc<ClusterWorkspace>>;
}

impl WorkspaceGetter for WorkspaceStore {
    fn get_workspace(&self, key: &ClusterAwareKey) -> Result<Arc<ClusterWorkspace>> {
        self.get(key)
            .ok_or_else(|| Error::not_found("clusterworkspaces", key.name.clone()))
    }
}

/// Lookup of system CRDs by cluster-aware key
///
/// May suspend: behind an in-memory cache a miss can trigger a quorum read
/// of the backing store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SystemCrdGetter: Send + Sync {
    /// Get the CRD at `key`, or a not-found error
    async fn get_crd(&self, key: &ClusterAwareKey) -> Result<Arc<CustomResourceDefinition>>;
}

#[async_trait]
impl SystemCrdGetter for CrdStore {
    async fn get_crd(&self, key: &ClusterAwareKey) -> Result<Arc<CustomResourceDefinition>> {
        self.get(key)
            .ok_or_else(|| Error::not_found("customresourcedefinitions", key.name.clone()))
    }
}

/// Registry of system CRDs projected into workspaces by type
pub struct SystemCrdRegistry {
    common: BTreeSet<ClusterAwareKey>,
    root: BTreeSet<ClusterAwareKey>,
    org: BTreeSet<ClusterAwareKey>,
    universal: BTreeSet<ClusterAwareKey>,

    workspaces: Arc<dyn WorkspaceGetter>,
    crds: Arc<dyn SystemCrdGetter>,
}

fn system_key(name: &str) -> ClusterAwareKey {
    ClusterAwareKey::new(LogicalClusterName::system_crds(), name)
}

impl SystemCrdRegistry {
    /// Build the registry, evaluating feature gates now
    pub fn new(
        gates: FeatureGates,
        workspaces: Arc<dyn WorkspaceGetter>,
        crds: Arc<dyn SystemCrdGetter>,
    ) -> Self {
        let common = COMMON_CRDS.iter().map(|name| system_key(name)).collect();
        let mut root = BTreeSet::new();
        let mut org = BTreeSet::new();
        let mut universal: BTreeSet<ClusterAwareKey> =
            UNIVERSAL_CRDS.iter().map(|name| system_key(name)).collect();

        // Each gate adds its CRD to root and org, and to universal for
        // discovery/OpenAPI projection; the three sets move together.
        if gates.location_api {
            root.insert(system_key(LOCATIONS_CRD));
            org.insert(system_key(LOCATIONS_CRD));
            universal.insert(system_key(LOCATIONS_CRD));
        }
        if gates.placement_api {
            root.insert(system_key(PLACEMENTS_CRD));
            org.insert(system_key(PLACEMENTS_CRD));
            universal.insert(system_key(PLACEMENTS_CRD));
        }

        Self {
            common,
            root,
            org,
            universal,
            workspaces,
            crds,
        }
    }

    /// The system CRD keys visible in `cluster`
    ///
    /// Root sees the root set; workspaces under root see the set their
    /// workspace type selects. A workspace that cannot be resolved yields an
    /// empty set, which surfaces downstream as a 404.
    pub fn keys(&self, cluster: &LogicalClusterName) -> BTreeSet<ClusterAwareKey> {
        if cluster.is_root() {
            return self.root.union(&self.common).cloned().collect();
        }

        if cluster.has_prefix(&LogicalClusterName::root()) {
            let (parent, name) = cluster.split();
            let workspace_key = ClusterAwareKey::new(parent, name);

            let workspace = match self.workspaces.get_workspace(&workspace_key) {
                Ok(workspace) => workspace,
                Err(err) => {
                    // A request for a nonexistent workspace (never existed,
                    // or deleted) gets no keys. Anything else is unexpected
                    // and worth a log line, but yields the same answer.
                    if !err.is_not_found() {
                        error!(
                            cluster = %cluster,
                            workspace_key = %workspace_key,
                            error = %err,
                            "unable to determine system CRD keys: error getting clusterworkspace"
                        );
                    }
                    return BTreeSet::new();
                }
            };

            let type_ = &workspace.spec.type_;
            if type_.as_str() == WorkspaceType::UNIVERSAL {
                return self.universal.union(&self.common).cloned().collect();
            }
            if type_.as_str() == WorkspaceType::ORGANIZATION
                || type_.as_str() == WorkspaceType::TEAM
            {
                return self.org.union(&self.common).cloned().collect();
            }
        }

        BTreeSet::new()
    }

    /// All system CRDs visible in `cluster`
    ///
    /// A miss for a named key is fatal: the getter is backed by a
    /// quorum-read client on cache miss, so the key set and the cache cannot
    /// legitimately disagree.
    pub async fn list(
        &self,
        cluster: &LogicalClusterName,
    ) -> Result<Vec<Arc<CustomResourceDefinition>>> {
        let keys = self.keys(cluster);
        let mut ret = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.crds.get_crd(key).await {
                Ok(crd) => ret.push(crd),
                Err(err) => {
                    error!(key = %key, cluster = %cluster, error = %err, "failed to get system CRD");
                    return Err(Error::internal(format!(
                        "error getting system CRD {key}: {err}"
                    )));
                }
            }
        }
        Ok(ret)
    }

    /// Whether `name` is a system CRD visible in `cluster`
    pub fn contains(&self, cluster: &LogicalClusterName, name: &str) -> bool {
        self.keys(cluster).contains(&system_key(name))
    }

    /// Fetch the system CRD named `name` directly, without type gating
    ///
    /// Used for wildcard requests, which span all workspaces.
    pub async fn get_ungated(&self, name: &str) -> Result<Arc<CustomResourceDefinition>> {
        self.crds.get_crd(&system_key(name)).await
    }

    /// Fetch the system CRD named `name` as visible from `cluster`
    pub async fn get(
        &self,
        cluster: &LogicalClusterName,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        if !self.contains(cluster, name) {
            return Err(Error::not_found("customresourcedefinitions", name));
        }
        self.crds.get_crd(&system_key(name)).await
    }
}
