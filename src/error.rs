//! Error types for the Trellis resolution core

use thiserror::Error;

/// Main error type for resolution and reconciliation
///
/// Variants carry the propagation policy of the operation that produced them:
/// `NotFound` is the expected miss, `ServiceUnavailable` signals a broken
/// binding contract, `Internal` a semantic conflict that must not be retried
/// by the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request context does not carry a logical cluster name
    #[error("no logical cluster name found in request context")]
    MissingClusterContext,

    /// The named object does not exist
    #[error("{resource} \"{name}\" not found")]
    NotFound {
        /// Resource type, e.g. `customresourcedefinitions`
        resource: &'static str,
        /// Object name that was requested
        name: String,
    },

    /// A binding declares the resource but its schema cannot be served
    #[error("{name} is currently unavailable")]
    ServiceUnavailable {
        /// CRD name that could not be served
        name: String,
    },

    /// Semantic conflict that cannot be recovered by retrying
    #[error("internal error: {0}")]
    Internal(String),

    /// Indexed store fault
    #[error("store error: {0}")]
    Store(String),

    /// API definition factory error
    #[error("api definition error: {0}")]
    Definition(String),
}

impl Error {
    /// Create a not-found error for the given resource type and object name
    pub fn not_found(resource: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            name: name.into(),
        }
    }

    /// Create a service-unavailable error for the given CRD name
    pub fn service_unavailable(name: impl Into<String>) -> Self {
        Self::ServiceUnavailable { name: name.into() }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a store error with the given message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an api definition error with the given message
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition(msg.into())
    }

    /// Returns true if this error is a not-found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Resolution and Reconciliation
    // ==========================================================================
    //
    // These tests demonstrate how errors flow out of the resolver and the
    // reconciler. Each error type represents a different failure category
    // with specific handling requirements at the serving layer.

    /// Story: missing objects surface as plain not-found
    ///
    /// A workspace asking for a resource kind that no source provides gets
    /// a 404, and resolution code needs to recognize the miss to fall
    /// through its priority chain instead of failing the call.
    #[test]
    fn story_unknown_resources_read_as_not_found() {
        // Scenario: the workspace never created nor bound the CRD
        let err = Error::not_found("customresourcedefinitions", "widgets.example.io");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("widgets.example.io"));
        assert!(err.to_string().contains("not found"));

        // Scenario: a system key lookup misses because the workspace was
        // deleted out from under the request
        let err = Error::not_found("clusterworkspaces", "team");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("clusterworkspaces"));

        // Not-found is categorized correctly for chain fall-through
        match Error::not_found("customresourcedefinitions", "any") {
            Error::NotFound { resource, name } => {
                assert_eq!(resource, "customresourcedefinitions");
                assert_eq!(name, "any");
            }
            _ => panic!("Expected NotFound variant"),
        }
    }

    /// Story: a broken binding contract is not a plain 404
    ///
    /// When a completed binding declares a resource but its shadow CRD is
    /// missing, the workspace is temporarily unserviceable for that kind.
    /// Surfacing 503 instead of 404 tells clients to retry rather than
    /// conclude the kind does not exist.
    #[test]
    fn story_broken_bindings_surface_as_unavailable() {
        // Scenario: bound resource declared, shadow CRD gone
        let err = Error::service_unavailable("widgets.example.io");
        assert_eq!(
            err.to_string(),
            "widgets.example.io is currently unavailable"
        );

        // A broken contract must never be mistaken for a miss, or the
        // resolver would fall through to a lower-priority source.
        assert!(!err.is_not_found());
    }

    /// Story: wildcard schema divergence is a semantic conflict
    ///
    /// Two workspaces serving the same resource name with different schemas
    /// cannot be watched through one wildcard stream. The error carries the
    /// diagnostic so operators can find the conflicting workspaces.
    #[test]
    fn story_wildcard_divergence_is_an_internal_error() {
        // Scenario: full-data wildcard read across distinct schemas
        let err = Error::internal(
            "cannot watch across logical clusters for a resource type with several distinct schemas",
        );
        assert!(err.to_string().starts_with("internal error:"));
        assert!(err.to_string().contains("cannot watch"));
        assert!(!err.is_not_found());
    }

    /// Story: requests outside cluster-aware plumbing are caller bugs
    ///
    /// Every resolution call must carry a logical cluster. A context without
    /// one did not come through the cluster-aware request filters and fails
    /// immediately rather than resolving against the wrong workspace.
    #[test]
    fn story_missing_cluster_context_fails_the_call() {
        // Scenario: a raw request bypassed the cluster middleware
        let err = Error::MissingClusterContext;
        assert!(err.to_string().contains("request context"));
        assert!(!err.is_not_found());
    }

    /// Story: error helper functions accept both String and &str
    ///
    /// For ergonomic API usage, error constructors accept anything that
    /// implements Into<String>.
    #[test]
    fn story_error_construction_ergonomics() {
        // From a formatted String
        let resource = "topics";
        let err = Error::definition(format!("no schema found for {resource}"));
        assert!(err.to_string().contains("topics"));

        // From a &str literal
        let err = Error::store("index unavailable");
        assert!(err.to_string().contains("index unavailable"));

        // From a dynamically built name
        let name = format!("widgets.{}", "example.io");
        let err = Error::not_found("customresourcedefinitions", name);
        assert!(err.to_string().contains("widgets.example.io"));
    }

    /// Story: errors are categorized for proper handling at the serving layer
    ///
    /// Different error types map to different HTTP answers and retry
    /// strategies (fall through, retry later, alert, fail permanently).
    #[test]
    fn story_error_categorization_for_http_mapping() {
        fn status_for(err: &Error) -> u16 {
            match err {
                Error::NotFound { .. } => 404,           // expected miss
                Error::ServiceUnavailable { .. } => 503, // retry later
                Error::MissingClusterContext => 400,     // caller bug
                _ => 500,                                // needs investigation
            }
        }

        // A miss is the ordinary 404 path
        assert_eq!(status_for(&Error::not_found("customresourcedefinitions", "x")), 404);

        // A broken binding asks the client to come back
        assert_eq!(status_for(&Error::service_unavailable("x")), 503);

        // A context without a cluster is the caller's fault
        assert_eq!(status_for(&Error::MissingClusterContext), 400);

        // Conflicts and infra faults need a human
        assert_eq!(status_for(&Error::internal("divergent schemas")), 500);
        assert_eq!(status_for(&Error::store("index corrupt")), 500);
        assert_eq!(status_for(&Error::definition("factory failed")), 500);
    }
}
