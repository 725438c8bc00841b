//! On-read CRD transformations
//!
//! CRDs cached in the stores are read-only; every transformation starts from
//! a copy whose annotations map is freshly allocated, so decorating one
//! request's answer can never leak into another's.

use std::collections::BTreeMap;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionCondition, CustomResourceDefinitionStatus,
    CustomResourceValidation, JSONSchemaProps,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::apis::IDENTITY_ANNOTATION;

/// Marker annotation on a CRD copy whose schemas were pruned to metadata only
pub const PARTIAL_METADATA_ANNOTATION: &str = "crd.kcp.dev/partial-metadata";

/// UID suffix discriminating wildcard partial-metadata projections in
/// downstream caches keyed by UID
pub const WILDCARD_PARTIAL_METADATA_UID_SUFFIX: &str = ".wildcard.partial-metadata";

const TERMINATING_CONDITION: &str = "Terminating";

/// Copy `in_` with a freshly allocated annotations map
///
/// The copy is safe to mutate; the cached original is untouched.
pub fn copy_with_fresh_annotations(in_: &CustomResourceDefinition) -> CustomResourceDefinition {
    let mut out = in_.clone();
    out.metadata.annotations = Some(
        in_.metadata
            .annotations
            .as_ref()
            .cloned()
            .unwrap_or_default(),
    );
    out
}

/// Copy and decorate `in_` as served through a binding
///
/// Sets the identity annotation so the storage layer can derive the right
/// resource prefix. When the binding is being deleted, the deletion timestamp
/// is propagated and a Terminating condition appended, which tells the
/// serving layer to drop the `create` verb from discovery.
pub fn decorate_with_binding(
    in_: &CustomResourceDefinition,
    identity: &str,
    deletion_timestamp: Option<&Time>,
) -> CustomResourceDefinition {
    let mut out = copy_with_fresh_annotations(in_);

    annotations_mut(&mut out).insert(IDENTITY_ANNOTATION.to_string(), identity.to_string());

    let Some(deletion_timestamp) = deletion_timestamp else {
        return out;
    };

    out.metadata.deletion_timestamp = Some(deletion_timestamp.clone());

    let status = out
        .status
        .get_or_insert_with(CustomResourceDefinitionStatus::default);
    let conditions = status.conditions.get_or_insert_with(Vec::new);
    conditions.push(CustomResourceDefinitionCondition {
        type_: TERMINATING_CONDITION.to_string(),
        status: "True".to_string(),
        last_transition_time: None,
        message: None,
        reason: None,
    });

    out
}

/// Prune `crd` in place to a partial-metadata projection
///
/// Marks the copy and replaces every version's validation schema with the
/// minimal open object schema, which prunes everything but standard object
/// metadata from stored objects. Idempotent.
pub fn make_partial_metadata(crd: &mut CustomResourceDefinition) {
    annotations_mut(crd).insert(PARTIAL_METADATA_ANNOTATION.to_string(), String::new());

    for version in &mut crd.spec.versions {
        version.schema = Some(CustomResourceValidation {
            open_api_v3_schema: Some(JSONSchemaProps {
                type_: Some("object".to_string()),
                ..Default::default()
            }),
        });
    }
}

/// Returns true if `crd` is a partial-metadata projection
pub(crate) fn is_partial_metadata(crd: &CustomResourceDefinition) -> bool {
    crd.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(PARTIAL_METADATA_ANNOTATION))
}

/// The identity annotation value, if a non-empty one is present
pub(crate) fn identity_annotation(crd: &CustomResourceDefinition) -> Option<&str> {
    crd.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(IDENTITY_ANNOTATION))
        .map(String::as_str)
        .filter(|identity| !identity.is_empty())
}

fn annotations_mut(crd: &mut CustomResourceDefinition) -> &mut BTreeMap<String, String> {
    crd.metadata.annotations.get_or_insert_with(BTreeMap::new)
}
