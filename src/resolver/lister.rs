//! Binding-aware CRD resolution
//!
//! [`BindingAwareCrdResolver`] merges three CRD sources per request with
//! strict precedence: system CRDs, CRDs imported through completed
//! APIBindings (served from shadow copies named by schema UID), and CRDs
//! local to the workspace. Wildcard requests resolve across all logical
//! clusters, gated on schema equivalence for full-data reads.

use std::collections::BTreeSet;
use std::sync::Arc;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::{debug, error};

use crate::apis::{APIBinding, IDENTITY_ANNOTATION};
use crate::cluster::{ClusterAwareKey, LogicalClusterName};
use crate::error::Error;
use crate::request::{LabelSelector, RequestContext};
use crate::store::{crd_group_resource_name, BindingStore, CrdStore, IdentityGroupResource};
use crate::Result;

use super::system::SystemCrdRegistry;
use super::transform::{
    copy_with_fresh_annotations, decorate_with_binding, identity_annotation, is_partial_metadata,
    make_partial_metadata, WILDCARD_PARTIAL_METADATA_UID_SUFFIX,
};

const CRD_RESOURCE: &str = "customresourcedefinitions";

/// Split a CRD resolution name into `(group, resource)`
///
/// `name` is `resource[.group]`; the user-facing spelling `core` of the
/// empty group is normalized away.
fn crd_name_to_group_resource(name: &str) -> (&str, &str) {
    let (resource, group) = match name.split_once('.') {
        Some((resource, group)) => (resource, group),
        None => (name, ""),
    };
    let group = if group == "core" { "" } else { group };
    (group, resource)
}

/// Workspace-aware CRD resolver
///
/// Re-entrant and stateless apart from the shared read-only stores; any
/// number of calls may run concurrently.
pub struct BindingAwareCrdResolver {
    system: Arc<SystemCrdRegistry>,
    crds: Arc<CrdStore>,
    bindings: Arc<BindingStore>,
}

impl BindingAwareCrdResolver {
    /// Create a resolver over the given registry and stores
    pub fn new(
        system: Arc<SystemCrdRegistry>,
        crds: Arc<CrdStore>,
        bindings: Arc<BindingStore>,
    ) -> Self {
        Self {
            system,
            crds,
            bindings,
        }
    }

    /// List all CRDs visible in the request's logical cluster
    ///
    /// The result is the three-way priority union, de-duplicated by
    /// resolution name: system CRDs first, then CRDs from completed bindings
    /// (decorated with their identity), then local CRDs. A fetch failure for
    /// an individual bound CRD is logged and skipped; the workspace stays
    /// serviceable when a subset of its bindings is broken.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        selector: &LabelSelector,
    ) -> Result<Vec<Arc<CustomResourceDefinition>>> {
        let cluster = ctx.cluster()?;

        let mut seen: BTreeSet<String> = BTreeSet::new();

        let mut ret = self.system.list(cluster).await?;
        for crd in &ret {
            seen.insert(crd_group_resource_name(crd));
        }

        for binding in self.bindings.list_workspace(cluster) {
            if !binding.is_initial_binding_completed() {
                continue;
            }
            for bound in binding.bound_resources() {
                let crd_key = ClusterAwareKey::new(
                    LogicalClusterName::bound_crds(),
                    bound.schema.uid.clone(),
                );
                let Some(crd) = self.crds.get(&crd_key) else {
                    error!(key = %crd_key, cluster = %cluster, "error getting bound CRD");
                    continue;
                };

                if !selector.matches(crd.metadata.labels.as_ref()) {
                    continue;
                }

                let name = crd_group_resource_name(&crd);
                if seen.contains(&name) {
                    debug!(
                        cluster = %cluster,
                        crd = %name,
                        "skipping binding CRD because it came in via system CRDs"
                    );
                    continue;
                }

                let decorated = decorate_with_binding(
                    &crd,
                    &bound.schema.identity_hash,
                    binding.metadata.deletion_timestamp.as_ref(),
                );
                ret.push(Arc::new(decorated));
                seen.insert(name);
            }
        }

        for crd in self.crds.list_workspace(cluster) {
            if !selector.matches(crd.metadata.labels.as_ref()) {
                continue;
            }
            let name = crd_group_resource_name(&crd);
            if seen.contains(&name) {
                debug!(
                    cluster = %cluster,
                    crd = %name,
                    "skipping local CRD because it came in via bindings or system CRDs"
                );
                continue;
            }
            ret.push(crd);
        }

        Ok(ret)
    }

    /// Get the CRD served under `name` in the request's logical cluster
    ///
    /// Strict priority chain, first hit wins: system, identity, wildcard
    /// partial-metadata, wildcard full-data, then normal single-cluster
    /// resolution (bindings before local). Partial-metadata requests get a
    /// projected copy.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        let cluster = ctx.cluster()?;
        let partial_metadata = ctx.is_partial_metadata_request();

        let resolved = match self.get_system_crd(cluster, name).await {
            Ok(crd) => crd,
            Err(err) if err.is_not_found() => {
                if let Some(identity) = ctx.identity() {
                    self.get_for_identity(name, identity)?
                } else if cluster.is_wildcard() && partial_metadata {
                    self.get_for_wildcard_partial_metadata(name)?
                } else if cluster.is_wildcard() {
                    self.get_for_full_data_wildcard(name)?
                } else {
                    self.get_in_cluster(cluster, name)?
                }
            }
            Err(err) => return Err(err),
        };

        if partial_metadata {
            let mut projected = copy_with_fresh_annotations(&resolved);
            make_partial_metadata(&mut projected);
            if cluster.is_wildcard() {
                projected.metadata.uid =
                    Some(format!("{name}{WILDCARD_PARTIAL_METADATA_UID_SUFFIX}"));
            }
            return Ok(Arc::new(projected));
        }

        Ok(resolved)
    }

    /// Re-fetch the authoritative copy of `crd` from its owning workspace
    ///
    /// Decorations on the input survive the refresh: the identity annotation,
    /// the partial-metadata projection, and the wildcard-partial-metadata UID.
    pub fn refresh(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<Arc<CustomResourceDefinition>> {
        let residence =
            LogicalClusterName::from_meta(&crd.metadata).unwrap_or_else(|| LogicalClusterName::new(""));
        let name = crd.metadata.name.clone().unwrap_or_default();
        let key = ClusterAwareKey::new(residence, name.clone());

        let updated = self
            .crds
            .get(&key)
            .ok_or_else(|| Error::not_found(CRD_RESOURCE, name))?;

        let mut refreshed = copy_with_fresh_annotations(&updated);

        if let Some(identity) = identity_annotation(crd) {
            refreshed
                .metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(IDENTITY_ANNOTATION.to_string(), identity.to_string());
        }

        if is_partial_metadata(crd) {
            make_partial_metadata(&mut refreshed);

            let wildcard_uid = crd
                .metadata
                .uid
                .as_ref()
                .filter(|uid| uid.ends_with(WILDCARD_PARTIAL_METADATA_UID_SUFFIX));
            if let Some(uid) = wildcard_uid {
                refreshed.metadata.uid = Some(uid.clone());
            }
        }

        Ok(Arc::new(refreshed))
    }

    async fn get_system_crd(
        &self,
        cluster: &LogicalClusterName,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        if cluster.is_wildcard() {
            // Wildcard requests span all workspaces; no type gating applies.
            return self.system.get_ungated(name).await;
        }
        self.system.get(cluster, name).await
    }

    /// Resolve a wildcard request carrying an identity, such as
    /// `/clusters/*/apis/$group/$version/$resource:$identity`
    fn get_for_identity(
        &self,
        name: &str,
        identity: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        let (group, resource) = crd_name_to_group_resource(name);

        let index_key = IdentityGroupResource::new(identity, group, resource);
        let bindings = self.bindings.list_by_identity_group_resource(&index_key);

        // Multiple bindings can match on identity/group/resource; the first
        // in deterministic order wins.
        let Some(binding) = bindings.first() else {
            return Err(Error::not_found(CRD_RESOURCE, name));
        };

        let bound = binding.bound_resources().iter().find(|r| {
            r.group == group && r.resource == resource && r.schema.identity_hash == identity
        });
        let Some(bound) = bound else {
            return Err(Error::not_found(CRD_RESOURCE, name));
        };

        let crd_key =
            ClusterAwareKey::new(LogicalClusterName::bound_crds(), bound.schema.uid.clone());
        let crd = self
            .crds
            .get(&crd_key)
            .ok_or_else(|| Error::not_found(CRD_RESOURCE, name))?;

        Ok(Arc::new(decorate_with_binding(
            &crd,
            identity,
            binding.metadata.deletion_timestamp.as_ref(),
        )))
    }

    fn get_for_wildcard_partial_metadata(
        &self,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        // Projection tolerates schema divergence; any instance will do.
        self.crds
            .list_by_group_resource_name(name)
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(CRD_RESOURCE, name))
    }

    fn get_for_full_data_wildcard(&self, name: &str) -> Result<Arc<CustomResourceDefinition>> {
        let mut found: Option<Arc<CustomResourceDefinition>> = None;
        for crd in self.crds.list_by_group_resource_name(name) {
            match &found {
                None => found = Some(crd),
                Some(first) if first.spec != crd.spec => {
                    return Err(Error::internal(
                        "error resolving resource: cannot watch across logical clusters for \
                         a resource type with several distinct schemas",
                    ));
                }
                Some(_) => {}
            }
        }
        found.ok_or_else(|| Error::not_found(CRD_RESOURCE, name))
    }

    fn get_in_cluster(
        &self,
        cluster: &LogicalClusterName,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        let (group, resource) = crd_name_to_group_resource(name);

        for binding in self.bindings.list_workspace(cluster) {
            if !binding.is_initial_binding_completed() {
                continue;
            }
            for bound in binding.bound_resources() {
                if bound.group != group || bound.resource != resource {
                    continue;
                }
                return self.get_bound_crd(
                    &binding,
                    &bound.schema.uid,
                    &bound.schema.identity_hash,
                    name,
                );
            }
        }

        let key = ClusterAwareKey::new(cluster.clone(), name);
        self.crds
            .get(&key)
            .ok_or_else(|| Error::not_found(CRD_RESOURCE, name))
    }

    fn get_bound_crd(
        &self,
        binding: &APIBinding,
        uid: &str,
        identity: &str,
        name: &str,
    ) -> Result<Arc<CustomResourceDefinition>> {
        let crd_key = ClusterAwareKey::new(LogicalClusterName::bound_crds(), uid);
        let Some(crd) = self.crds.get(&crd_key) else {
            // The binding says this resource exists, but the shadow CRD is
            // gone: the binding contract is broken, not a plain 404.
            return Err(Error::service_unavailable(name));
        };
        Ok(Arc::new(decorate_with_binding(
            &crd,
            identity,
            binding.metadata.deletion_timestamp.as_ref(),
        )))
    }
}
