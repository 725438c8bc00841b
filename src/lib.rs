//! Trellis - workspace-aware CRD resolution core for a multi-tenant control plane
//!
//! Trellis lets a single declarative resource server host many isolated logical
//! workspaces. The set of resource kinds visible in each workspace is the union
//! of three sources with well-defined precedence: system-provided CRDs,
//! CRDs imported through APIBindings, and CRDs created locally in the
//! workspace.
//!
//! # Architecture
//!
//! Two subsystems cooperate:
//!
//! - The **resolver** answers per-request questions: given a logical cluster
//!   (possibly the wildcard) and an optional API identity, which CRD should be
//!   served under a given name? It merges the system registry with the indexed
//!   stores, applying system ≻ binding ≻ local precedence, and performs the
//!   on-read transformations (binding decoration, partial-metadata projection).
//! - The **controller** watches SyncTarget, APIExport and APIResourceSchema
//!   streams and maintains per-API-domain sets of live API definitions that
//!   the serving layer binds dynamic handlers to.
//!
//! Informer machinery, HTTP serving, authentication, admission and storage are
//! external collaborators; Trellis holds only borrowed read caches and the
//! definition registry.
//!
//! # Modules
//!
//! - [`apis`] - control-plane API object model (workspaces, bindings, exports)
//! - [`cluster`] - logical cluster names and cluster-aware store keys
//! - [`request`] - request context (cluster, identity, Accept negotiation)
//! - [`store`] - indexed read caches fed by the informer layer
//! - [`resolver`] - system CRD registry and the binding-aware CRD resolver
//! - [`controller`] - API reconciler, work queue and the definition registry
//! - [`error`] - error types for the crate

#![deny(missing_docs)]

pub mod apis;
pub mod cluster;
pub mod controller;
pub mod error;
pub mod request;
pub mod resolver;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
