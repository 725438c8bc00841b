//! Request context for resolution calls
//!
//! Every resolver call carries a [`RequestContext`]: the logical cluster the
//! request targets (possibly the wildcard), an optional API identity that
//! disambiguates bindings of the same group-resource, and the verbatim
//! `Accept` header used for partial-metadata content negotiation.

use std::collections::BTreeMap;

use crate::cluster::LogicalClusterName;
use crate::error::Error;

/// Media-type parameter value requesting a single partial-metadata object
const AS_PARTIAL_OBJECT_METADATA: &str = "PartialObjectMetadata";

/// Media-type parameter value requesting a partial-metadata list
const AS_PARTIAL_OBJECT_METADATA_LIST: &str = "PartialObjectMetadataList";

/// Per-request resolution context
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cluster: Option<LogicalClusterName>,
    identity: Option<String>,
    accept: Option<String>,
}

impl RequestContext {
    /// Create a context scoped to the given logical cluster
    pub fn new(cluster: LogicalClusterName) -> Self {
        Self {
            cluster: Some(cluster),
            identity: None,
            accept: None,
        }
    }

    /// Attach the API identity string from the request path
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Attach the verbatim `Accept` header
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// The logical cluster this request targets
    ///
    /// Fails when the context was built without one; the caller did not go
    /// through cluster-aware request plumbing.
    pub fn cluster(&self) -> Result<&LogicalClusterName, Error> {
        self.cluster.as_ref().ok_or(Error::MissingClusterContext)
    }

    /// The API identity, if a non-empty one was provided
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns true if the `Accept` header asks for partial object metadata
    pub fn is_partial_metadata_request(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(is_partial_metadata_header)
    }
}

/// Returns true if any clause of the `Accept` header carries
/// `as=PartialObjectMetadata` or `as=PartialObjectMetadataList`
///
/// Content negotiation over comma-separated alternatives; the first matching
/// clause wins.
pub fn is_partial_metadata_header(accept: &str) -> bool {
    accept.split(',').any(|clause| {
        clause.split(';').skip(1).any(|param| {
            match param.split_once('=') {
                Some((key, value)) => {
                    key.trim() == "as"
                        && matches!(
                            value.trim(),
                            AS_PARTIAL_OBJECT_METADATA | AS_PARTIAL_OBJECT_METADATA_LIST
                        )
                }
                None => false,
            }
        })
    })
}

/// Label selector for list requests
///
/// Equality-based matching only: an object matches when every entry of
/// `match_labels` is present in its labels. The default (empty) selector
/// matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    /// Labels an object must carry to match
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// The selector that matches every object
    pub fn everything() -> Self {
        Self::default()
    }

    /// Create a selector from `(key, value)` pairs
    pub fn from_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns true if the given label set satisfies this selector
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        if self.match_labels.is_empty() {
            return true;
        }
        let Some(labels) = labels else {
            return false;
        };
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}
