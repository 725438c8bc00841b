//! Control-plane API object model
//!
//! This module contains the API types the resolution core reads: workspaces,
//! bindings, exports, resource schemas and sync targets. All of them are
//! cluster-scoped custom resources; their logical-cluster residence is carried
//! in the `kcp.dev/cluster` annotation.

mod binding;
mod conditions;
mod export;
mod sync_target;
mod workspace;

pub use binding::{
    APIBinding, APIBindingSpec, APIBindingStatus, BoundAPIResource, BoundSchemaReference,
    ExportReference, IDENTITY_ANNOTATION, INITIAL_BINDING_COMPLETED,
};
pub use conditions::{is_condition_true, Condition, ConditionStatus};
pub use export::{
    APIExport, APIExportSpec, APIExportStatus, APIResourceSchema, APIResourceSchemaSpec,
    APIResourceVersion, ResourceNames,
};
pub use sync_target::{ResourceToSync, SyncTarget, SyncTargetSpec, SyncTargetStatus};
pub use workspace::{
    ClusterWorkspace, ClusterWorkspaceSpec, ClusterWorkspaceStatus, WorkspacePhase, WorkspaceType,
};
