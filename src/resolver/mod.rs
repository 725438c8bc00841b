//! Workspace-aware CRD resolution
//!
//! The resolver answers which CustomResourceDefinition should be served for a
//! request, merging three sources with strict precedence: system CRDs,
//! binding-imported CRDs, and workspace-local CRDs. It also performs the
//! on-read transformations: binding decoration (identity annotation,
//! terminating status) and partial-metadata projection.

mod lister;
mod system;
mod transform;

pub use lister::BindingAwareCrdResolver;
pub use system::{FeatureGates, SystemCrdGetter, SystemCrdRegistry, WorkspaceGetter};
pub use transform::{
    copy_with_fresh_annotations, decorate_with_binding, make_partial_metadata,
    PARTIAL_METADATA_ANNOTATION, WILDCARD_PARTIAL_METADATA_UID_SUFFIX,
};
