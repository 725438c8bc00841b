//! APIExport and APIResourceSchema custom resources
//!
//! An APIExport publishes a bundle of APIResourceSchemas under a stable
//! identity hash. Bindings and sync targets reference exports; the reconciler
//! resolves exports down to their constituent schemas.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::Condition;

/// Specification for an APIExport
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apis.kcp.dev",
    version = "v1alpha1",
    kind = "APIExport",
    plural = "apiexports",
    status = "APIExportStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct APIExportSpec {
    /// Names of the APIResourceSchemas this export currently serves
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latest_resource_schemas: Vec<String>,
}

/// Status for an APIExport
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIExportStatus {
    /// Stable opaque hash distinguishing this export from other exports of
    /// the same group-resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_hash: Option<String>,

    /// Conditions representing the export state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl APIExport {
    /// The export's identity hash, empty until status is populated
    pub fn identity_hash(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.identity_hash.as_deref())
            .unwrap_or("")
    }
}

/// Naming of a resource served by an APIResourceSchema
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNames {
    /// Plural resource name, e.g. `widgets`
    pub plural: String,
    /// Singular resource name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub singular: String,
    /// CamelCase kind, e.g. `Widget`
    pub kind: String,
    /// Kind of the list type
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub list_kind: String,
}

/// One served version of an APIResourceSchema
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIResourceVersion {
    /// Version name, e.g. `v1alpha1`
    pub name: String,
    /// Whether this version is served
    #[serde(default)]
    pub served: bool,
    /// Whether this version is the storage version
    #[serde(default)]
    pub storage: bool,
    /// Validation schema for this version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// Specification for an APIResourceSchema
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apis.kcp.dev",
    version = "v1alpha1",
    kind = "APIResourceSchema",
    plural = "apiresourceschemas",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct APIResourceSchemaSpec {
    /// API group of the served resource (empty for the core group)
    #[serde(default)]
    pub group: String,

    /// Resource naming
    pub names: ResourceNames,

    /// Served versions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<APIResourceVersion>,
}

impl APIResourceSchema {
    /// Returns true if this schema serves the given version
    pub fn serves_version(&self, version: &str) -> bool {
        self.spec
            .versions
            .iter()
            .any(|v| v.name == version && v.served)
    }

    /// Returns true if this schema defines the given group-resource
    pub fn defines(&self, group: &str, resource: &str) -> bool {
        self.spec.group == group && self.spec.names.plural == resource
    }
}
