//! Indexed read caches over the control-plane API objects
//!
//! The informer layer owns watching and delta handling; it feeds these stores
//! through `insert`/`remove`. Resolution and reconciliation only read. Every
//! store keeps a primary cluster-aware key map plus the secondary indexes its
//! readers need, and every read returns owned `Arc` snapshots taken under a
//! single lock acquisition, so a call observes a consistent view for its
//! duration.
//!
//! Keys are composite `(cluster, name)` pairs; plain names would collide
//! across workspaces.

mod bindings;
mod crds;
mod exports;
mod schemas;
mod sync_targets;
mod workspaces;

pub use bindings::{BindingStore, IdentityGroupResource};
pub use crds::{crd_group_resource_name, CrdStore};
pub use exports::ExportStore;
pub use schemas::SchemaStore;
pub use sync_targets::SyncTargetStore;
pub use workspaces::WorkspaceStore;

pub(crate) use sync_targets::export_keys;
