//! APIBinding custom resource
//!
//! An APIBinding is a workspace's subscription to an APIExport. Once the
//! initial binding completes, the bound resources materialize in the
//! workspace's visible CRD set, served from shadow copies named by schema
//! UID.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{is_condition_true, Condition};

/// Annotation carrying the APIExport identity hash on a decorated CRD
pub const IDENTITY_ANNOTATION: &str = "apis.kcp.dev/identity";

/// Condition type marking that the initial binding has completed
pub const INITIAL_BINDING_COMPLETED: &str = "InitialBindingCompleted";

/// Reference to an APIExport in another (or the same) workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportReference {
    /// Logical cluster path of the workspace holding the export
    pub path: String,
    /// Name of the APIExport
    pub export_name: String,
}

impl ExportReference {
    /// Create a reference to `export_name` in the workspace at `path`
    pub fn new(path: impl Into<String>, export_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            export_name: export_name.into(),
        }
    }
}

/// Specification for an APIBinding
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apis.kcp.dev",
    version = "v1alpha1",
    kind = "APIBinding",
    plural = "apibindings",
    status = "APIBindingStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct APIBindingSpec {
    /// The export this binding imports resources from
    pub reference: ExportReference,
}

/// Reference to the schema backing a bound resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoundSchemaReference {
    /// Name of the APIResourceSchema
    pub name: String,
    /// UID of the schema; also the shadow CRD's name
    pub uid: String,
    /// Identity hash of the export that published the schema
    pub identity_hash: String,
}

/// A single resource imported by a binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoundAPIResource {
    /// API group of the bound resource (empty for the core group)
    #[serde(default)]
    pub group: String,
    /// Plural resource name
    pub resource: String,
    /// Schema backing this resource
    pub schema: BoundSchemaReference,
}

/// Status for an APIBinding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIBindingStatus {
    /// Resources this binding has materialized into the workspace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bound_resources: Vec<BoundAPIResource>,

    /// Conditions representing the binding state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl APIBinding {
    /// Returns true once the initial binding has completed
    ///
    /// Bindings that have not completed are invisible to resolution.
    pub fn is_initial_binding_completed(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| is_condition_true(&s.conditions, INITIAL_BINDING_COMPLETED))
    }

    /// The bound resources, empty when status is absent
    pub fn bound_resources(&self) -> &[BoundAPIResource] {
        self.status
            .as_ref()
            .map(|s| s.bound_resources.as_slice())
            .unwrap_or(&[])
    }
}
