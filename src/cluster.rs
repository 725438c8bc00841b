//! Logical cluster names and cluster-aware store keys
//!
//! A logical cluster is a tenant-isolated namespace within a single server,
//! identified by a hierarchical `:`-separated path such as `root:org:team`.
//! Objects record their residence in the [`CLUSTER_ANNOTATION`] annotation,
//! which is how a cached object can be traced back to its workspace.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Annotation carrying the logical cluster an object resides in
pub const CLUSTER_ANNOTATION: &str = "kcp.dev/cluster";

/// Reserved logical cluster holding the system CRDs
pub const SYSTEM_CRDS_CLUSTER: &str = "system:system-crds";

/// Reserved logical cluster holding binding-imported CRDs, named by schema UID
pub const BOUND_CRDS_CLUSTER: &str = "system:bound-crds";

/// Hierarchical name of a logical cluster
///
/// Supports the distinguished wildcard value `*` which matches all workspaces
/// for read purposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalClusterName(String);

impl LogicalClusterName {
    /// Separator between path segments
    pub const SEPARATOR: char = ':';

    const WILDCARD: &'static str = "*";
    const ROOT: &'static str = "root";

    /// Create a logical cluster name from its string form
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The root cluster
    pub fn root() -> Self {
        Self::new(Self::ROOT)
    }

    /// The wildcard cluster, matching all workspaces on reads
    pub fn wildcard() -> Self {
        Self::new(Self::WILDCARD)
    }

    /// The reserved residence of system CRDs
    pub fn system_crds() -> Self {
        Self::new(SYSTEM_CRDS_CLUSTER)
    }

    /// The reserved shadow residence of binding-imported CRDs
    pub fn bound_crds() -> Self {
        Self::new(BOUND_CRDS_CLUSTER)
    }

    /// Returns true for the wildcard cluster
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// Returns true for the root cluster
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Returns true if `prefix` is this name or an ancestor of it
    ///
    /// `root:org:team` has prefixes `root`, `root:org` and itself; it does
    /// not have prefix `root:o`.
    pub fn has_prefix(&self, prefix: &LogicalClusterName) -> bool {
        if self.0 == prefix.0 {
            return true;
        }
        self.0
            .strip_prefix(&prefix.0)
            .is_some_and(|rest| rest.starts_with(Self::SEPARATOR))
    }

    /// Split into the parent cluster and the final path segment
    ///
    /// A single-segment name splits into an empty parent.
    pub fn split(&self) -> (LogicalClusterName, &str) {
        match self.0.rsplit_once(Self::SEPARATOR) {
            Some((parent, leaf)) => (Self::new(parent), leaf),
            None => (Self::new(""), self.0.as_str()),
        }
    }

    /// Append a child segment to this name
    pub fn join(&self, segment: &str) -> LogicalClusterName {
        if self.0.is_empty() {
            Self::new(segment)
        } else {
            Self::new(format!("{}{}{}", self.0, Self::SEPARATOR, segment))
        }
    }

    /// String form of the name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the residence of an object from its cluster annotation
    pub fn from_meta(meta: &ObjectMeta) -> Option<LogicalClusterName> {
        meta.annotations
            .as_ref()
            .and_then(|a| a.get(CLUSTER_ANNOTATION))
            .map(|cluster| Self::new(cluster.as_str()))
    }
}

impl fmt::Display for LogicalClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalClusterName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Composite `(cluster, name)` key used by every store index
///
/// Plain object names collide across workspaces; a cluster-aware key never
/// does.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterAwareKey {
    /// Logical cluster the object resides in
    pub cluster: LogicalClusterName,
    /// Object name within that cluster
    pub name: String,
}

impl ClusterAwareKey {
    /// Create a key for `name` residing in `cluster`
    pub fn new(cluster: LogicalClusterName, name: impl Into<String>) -> Self {
        Self {
            cluster,
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterAwareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.cluster, self.name)
    }
}
