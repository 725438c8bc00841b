//! ClusterWorkspace custom resource
//!
//! A ClusterWorkspace is the declarative record of a logical cluster: its
//! type decides which system CRDs are visible inside it. The resolution core
//! only reads workspaces; their lifecycle is owned elsewhere.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::Condition;

/// Type of a cluster workspace
///
/// `Universal`, `Organization` and `Team` are built in; any other value is a
/// user-defined type.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct WorkspaceType(String);

impl WorkspaceType {
    /// The Universal workspace type
    pub const UNIVERSAL: &'static str = "Universal";
    /// The Organization workspace type
    pub const ORGANIZATION: &'static str = "Organization";
    /// The Team workspace type
    pub const TEAM: &'static str = "Team";

    /// Create a workspace type from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Type name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkspaceType {
    fn default() -> Self {
        Self::new(Self::UNIVERSAL)
    }
}

impl std::fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Specification for a ClusterWorkspace
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.kcp.dev",
    version = "v1alpha1",
    kind = "ClusterWorkspace",
    plural = "clusterworkspaces",
    status = "ClusterWorkspaceStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkspaceSpec {
    /// Type of this workspace, deciding its system CRD set
    #[serde(rename = "type", default)]
    pub type_: WorkspaceType,
}

/// Lifecycle phase of a cluster workspace
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum WorkspacePhase {
    /// Workspace is waiting for a shard assignment
    #[default]
    Scheduling,
    /// Workspace content is being initialized
    Initializing,
    /// Workspace is serving
    Ready,
}

/// Status for a ClusterWorkspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterWorkspaceStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: WorkspacePhase,

    /// Conditions representing the workspace state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_type_defaults_to_universal() {
        assert_eq!(WorkspaceType::default().as_str(), WorkspaceType::UNIVERSAL);
        assert_eq!(ClusterWorkspaceSpec::default().type_, WorkspaceType::default());
    }

    #[test]
    fn user_defined_types_round_trip_through_serde() {
        let spec = ClusterWorkspaceSpec {
            type_: WorkspaceType::new("Sandbox"),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "Sandbox");

        let back: ClusterWorkspaceSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.type_.as_str(), "Sandbox");
    }
}
