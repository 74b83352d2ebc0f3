//! Tiered cross-namespace template resolution
//!
//! Resolution is a pure lookup policy shared by the admission webhook and
//! the workspace reconciler, so both always agree on which template a
//! reference denotes. The policy is an ordered list of candidate namespaces
//! with first-success-wins semantics:
//!
//! 1. Explicit `templateRef.namespace`: exactly that namespace, no fallback.
//! 2. Empty namespace: the workspace's own namespace, then the configured
//!    shared namespace. The workspace's namespace strictly dominates even
//!    when both contain a same-named template.
//!
//! Failure produces [`Error::TemplateNotFound`] enumerating every namespace
//! searched.

use async_trait::async_trait;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::crd::{TemplateRef, WorkspaceTemplate};
use crate::Error;

/// Trait abstracting template lookup against the backing store
///
/// Allows the resolver to stay pure and testable; the real implementation
/// is a thin wrapper over the Kubernetes API.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TemplateLookup: Send + Sync {
    /// Get a template by namespace and name, or None if it does not exist.
    ///
    /// Transport-level failures are returned as errors, never mapped to
    /// None: "absent" and "unreachable" must stay distinguishable.
    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkspaceTemplate>, Error>;
}

/// Real template lookup backed by the Kubernetes API
pub struct KubeTemplateLookup {
    client: Client,
}

impl KubeTemplateLookup {
    /// Create a lookup wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateLookup for KubeTemplateLookup {
    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkspaceTemplate>, Error> {
        let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// The namespace tier that satisfied (or is being tried for) a resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionTier {
    /// The namespace named explicitly in the templateRef
    Explicit,
    /// The workspace's own namespace
    WorkspaceNamespace,
    /// The configured default/shared namespace
    DefaultNamespace,
}

/// One candidate lookup in resolution order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Which tier this candidate belongs to
    pub tier: ResolutionTier,
    /// The namespace to search
    pub namespace: String,
}

/// A successfully resolved template with the tier that satisfied it
#[derive(Clone, Debug)]
pub struct ResolvedTemplate {
    /// The resolved template object
    pub template: WorkspaceTemplate,
    /// The namespace the template was found in
    pub namespace: String,
    /// The tier that satisfied resolution
    pub tier: ResolutionTier,
}

/// Build the ordered candidate list for a template reference.
///
/// An explicit namespace yields exactly one candidate: the explicit tier
/// never falls through to the workspace or shared namespace. The implicit
/// path yields the workspace namespace followed by the shared namespace,
/// deduplicated when they coincide.
pub fn resolution_candidates(
    template_ref: &TemplateRef,
    workspace_namespace: &str,
    default_namespace: &str,
) -> Vec<Candidate> {
    if let Some(explicit) = template_ref.explicit_namespace() {
        return vec![Candidate {
            tier: ResolutionTier::Explicit,
            namespace: explicit.to_string(),
        }];
    }

    let mut candidates = vec![Candidate {
        tier: ResolutionTier::WorkspaceNamespace,
        namespace: workspace_namespace.to_string(),
    }];

    if default_namespace != workspace_namespace {
        candidates.push(Candidate {
            tier: ResolutionTier::DefaultNamespace,
            namespace: default_namespace.to_string(),
        });
    }

    candidates
}

/// Resolve a template reference to a concrete template.
///
/// Pure apart from the injected lookup: no side effects, same inputs give
/// the same resolved identity. Transport errors from the lookup propagate
/// immediately without falling through to later tiers.
pub async fn resolve(
    lookup: &dyn TemplateLookup,
    template_ref: &TemplateRef,
    workspace_namespace: &str,
    default_namespace: &str,
) -> Result<ResolvedTemplate, Error> {
    let candidates = resolution_candidates(template_ref, workspace_namespace, default_namespace);

    let mut tried = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        tried.push(candidate.namespace.clone());

        if let Some(template) = lookup
            .get_template(&candidate.namespace, &template_ref.name)
            .await?
        {
            return Ok(ResolvedTemplate {
                template,
                namespace: candidate.namespace,
                tier: candidate.tier,
            });
        }
    }

    Err(Error::template_not_found(&template_ref.name, tried))
}
