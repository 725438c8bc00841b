//! SyncTarget custom resource
//!
//! A SyncTarget declares a consumer domain that wants a set of exported
//! resources synced to it. Its status records which resources are actually
//! being synced; the reconciler materializes API definitions from that list.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::binding::ExportReference;
use super::conditions::Condition;

/// Specification for a SyncTarget
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workload.kcp.dev",
    version = "v1alpha1",
    kind = "SyncTarget",
    plural = "synctargets",
    status = "SyncTargetStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct SyncTargetSpec {
    /// Exports whose resources should be synced to this target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_api_exports: Vec<ExportReference>,
}

/// A resource the sync target is currently syncing
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceToSync {
    /// API group of the synced resource (empty for the core group)
    #[serde(default)]
    pub group: String,
    /// Plural resource name
    pub resource: String,
    /// Versions being synced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<String>,
    /// Identity hash of the export the resource comes from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identity_hash: String,
}

/// Status for a SyncTarget
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncTargetStatus {
    /// Resources currently synced to this target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synced_resources: Vec<ResourceToSync>,

    /// Conditions representing the sync target state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SyncTarget {
    /// The synced resources, empty when status is absent
    pub fn synced_resources(&self) -> &[ResourceToSync] {
        self.status
            .as_ref()
            .map(|s| s.synced_resources.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synced_resources_default_to_empty() {
        let target = SyncTarget::new("us-east1", SyncTargetSpec::default());
        assert!(target.synced_resources().is_empty());
    }

    #[test]
    fn synced_resource_lists_compare_deeply() {
        let a = vec![ResourceToSync {
            group: "example.io".to_string(),
            resource: "widgets".to_string(),
            versions: vec!["v1".to_string()],
            identity_hash: "deadbeef".to_string(),
        }];
        let same = a.clone();
        let mut different = a.clone();
        different[0].versions.push("v2".to_string());

        // The reconciler only enqueues updates where this comparison fails.
        assert_eq!(a, same);
        assert_ne!(a, different);
    }
}
