//! Live API definitions and their domain keys
//!
//! An [`ApiDefinition`] is a servable resource version: dynamic handlers,
//! storage and watches bound by the serving layer. Trellis never constructs
//! one itself; the injected [`ApiDefinitionFactory`] does. What Trellis owns
//! is the lifecycle: every definition published to the registry is torn down
//! exactly once, either when it drops out of its set or at shutdown.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::apis::APIResourceSchema;
use crate::cluster::LogicalClusterName;
use crate::Result;

/// Partition key for the reconciler's output, `<workspace>/<syncTargetName>`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiDomainKey(String);

impl ApiDomainKey {
    /// Create a key from its opaque string form
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a sync target
    pub fn from_sync_target(workspace: &LogicalClusterName, sync_target_name: &str) -> Self {
        Self(format!("{workspace}/{sync_target_name}"))
    }

    /// String form of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiDomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coordinates of a served resource version
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionResource {
    /// API group (empty for the core group)
    pub group: String,
    /// Version name
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupVersionResource {
    /// Create coordinates for `resource.group/version`
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.resource, self.version)
        } else {
            write!(f, "{}.{}/{}", self.resource, self.group, self.version)
        }
    }
}

/// A live, servable API bound by the serving layer
#[cfg_attr(test, automock)]
pub trait ApiDefinition: Send + Sync {
    /// Release everything backing this definition (watches, storage)
    ///
    /// Called exactly once, when the definition drops out of its set or when
    /// the reconciler shuts down.
    fn tear_down(&self);
}

/// Factory for API definitions, injected by the serving layer
///
/// May perform I/O; this is the only suspension point inside the reconciler.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApiDefinitionFactory: Send + Sync {
    /// Create the definition serving `schema`'s `version` for the given sync
    /// target
    async fn create_api_definition(
        &self,
        workspace: &LogicalClusterName,
        sync_target_name: &str,
        schema: &APIResourceSchema,
        version: &str,
        identity_hash: &str,
    ) -> Result<Arc<dyn ApiDefinition>>;
}

/// A published definition plus the provenance that produced it
///
/// The provenance lets the reconciler detect that a definition must be
/// replaced because its backing schema or identity changed, not just added
/// or removed.
#[derive(Clone)]
pub struct ApiDefinitionEntry {
    /// UID (or name, when no UID is set) of the backing schema
    pub schema_uid: String,
    /// Identity hash the definition serves under
    pub identity_hash: String,
    /// The live definition
    pub definition: Arc<dyn ApiDefinition>,
}

/// The definitions serving one API domain
pub type ApiDefinitionSet = HashMap<GroupVersionResource, ApiDefinitionEntry>;
