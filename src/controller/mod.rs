//! Controller maintaining the live API definition registry
//!
//! This module contains the reconciliation side of the crate: a rate-limited
//! work queue, the API reconciler consuming sync-target, export and schema
//! events, and the registry of per-API-domain definition sets the serving
//! layer reads.

mod api_reconciler;
mod definition;
mod queue;
mod registry;

pub use api_reconciler::{ApiReconciler, ReconcilerConfig};
pub use definition::{
    ApiDefinition, ApiDefinitionEntry, ApiDefinitionFactory, ApiDefinitionSet, ApiDomainKey,
    GroupVersionResource,
};
pub use queue::RateLimitingQueue;
pub use registry::ApiDomainRegistry;
