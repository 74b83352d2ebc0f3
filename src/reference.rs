//! Template reference tracking and finalizer management
//!
//! Maintains, per WorkspaceTemplate, the set of workspaces currently
//! referencing it, and derives the protection finalizer from that set:
//! present exactly when the set is non-empty. The set is stored as an
//! explicit reverse index in the template's
//! `workspace.jupyter.org/referenced-by` annotation (sorted,
//! comma-separated `namespace/name` entries).
//!
//! Reconcilers for any number of workspaces across any number of namespaces
//! may mutate the same shared template concurrently, so every mutation is a
//! read-modify-write loop conditioned on the object's resourceVersion: on
//! conflict, re-read and recompute. Conflicts are never surfaced and never
//! counted against a retry budget; a lost update would be a correctness bug.
//!
//! Annotation and finalizer are written in the same conditional update, so
//! no stored version of a template can have a finalizer that disagrees with
//! its reference set.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::WorkspaceTemplate;
use crate::{Error, REFERENCED_BY_ANNOTATION, TEMPLATE_PROTECTION_FINALIZER};

/// A namespace-qualified object name, formatted as `namespace/name`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamespacedName {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl NamespacedName {
    /// Create a namespaced name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` string
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, name) = s.split_once('/')?;
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(namespace, name))
    }
}

impl std::fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Trait abstracting conditional template reads/writes
///
/// `update` must be conditional on the resourceVersion carried by the
/// object: a concurrent modification surfaces as a 409 error rather than a
/// lost update. The real implementation uses the Kubernetes replace verb,
/// which has exactly these semantics.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Get a template, or None if it does not exist
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<WorkspaceTemplate>, Error>;

    /// Replace a template, conditioned on its resourceVersion
    async fn update(&self, template: &WorkspaceTemplate) -> Result<WorkspaceTemplate, Error>;
}

/// Real template store backed by the Kubernetes API
pub struct KubeTemplateStore {
    client: Client,
}

impl KubeTemplateStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TemplateStore for KubeTemplateStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkspaceTemplate>, Error> {
        let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update(&self, template: &WorkspaceTemplate) -> Result<WorkspaceTemplate, Error> {
        let namespace = template
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::validation("template has no namespace"))?;
        let name = template
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("template has no name"))?;

        let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.replace(name, &PostParams::default(), template).await?)
    }
}

/// Parse the reference set from a template's annotation
pub fn parse_references(template: &WorkspaceTemplate) -> BTreeSet<NamespacedName> {
    template
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(REFERENCED_BY_ANNOTATION))
        .map(|value| {
            value
                .split(',')
                .filter_map(NamespacedName::parse)
                .collect()
        })
        .unwrap_or_default()
}

/// Write the reference set onto a template, deriving the finalizer.
///
/// Non-empty set: annotation holds the sorted entries and the protection
/// finalizer is present. Empty set: annotation and finalizer are removed.
pub fn write_references(template: &mut WorkspaceTemplate, refs: &BTreeSet<NamespacedName>) {
    let annotations = template.metadata.annotations.get_or_insert_with(Default::default);
    if refs.is_empty() {
        annotations.remove(REFERENCED_BY_ANNOTATION);
    } else {
        let value = refs
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",");
        annotations.insert(REFERENCED_BY_ANNOTATION.to_string(), value);
    }
    if annotations.is_empty() {
        template.metadata.annotations = None;
    }

    let finalizers = template.metadata.finalizers.get_or_insert_with(Vec::new);
    let has_finalizer = finalizers.iter().any(|f| f == TEMPLATE_PROTECTION_FINALIZER);
    if refs.is_empty() {
        finalizers.retain(|f| f != TEMPLATE_PROTECTION_FINALIZER);
    } else if !has_finalizer {
        finalizers.push(TEMPLATE_PROTECTION_FINALIZER.to_string());
    }
    if finalizers.is_empty() {
        template.metadata.finalizers = None;
    }
}

/// True if the finalizer state already matches the reference set
fn finalizer_consistent(template: &WorkspaceTemplate, refs: &BTreeSet<NamespacedName>) -> bool {
    let has_finalizer = template
        .metadata
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|f| f == TEMPLATE_PROTECTION_FINALIZER))
        .unwrap_or(false);
    has_finalizer == !refs.is_empty()
}

/// Tracks workspace references on templates and manages the protection
/// finalizer
#[derive(Clone)]
pub struct ReferenceTracker {
    store: Arc<dyn TemplateStore>,
}

impl ReferenceTracker {
    /// Create a tracker over the given store
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Ensure the workspace is recorded as referencing the template and the
    /// protection finalizer is present.
    ///
    /// Works identically for same-namespace and cross-namespace references,
    /// and on templates already pending deletion (finalizer additions during
    /// the pendingDeletion window keep the object retrievable).
    pub async fn ensure_reference(
        &self,
        template: &NamespacedName,
        workspace: &NamespacedName,
    ) -> Result<(), Error> {
        self.mutate(template, MissingTemplate::Fail, |refs| {
            refs.insert(workspace.clone());
        })
        .await
    }

    /// Remove the workspace's reference from the template. If the set
    /// becomes empty the finalizer is removed, letting a pending deletion
    /// complete. A missing template is a no-op.
    pub async fn remove_reference(
        &self,
        template: &NamespacedName,
        workspace: &NamespacedName,
    ) -> Result<(), Error> {
        self.mutate(template, MissingTemplate::Ignore, |refs| {
            refs.remove(workspace);
        })
        .await
    }

    /// Remove a batch of stale references (workspaces that no longer exist
    /// or are terminating). Used by the template reconciler to converge the
    /// reference set without workspace-side finalizers.
    pub async fn remove_references(
        &self,
        template: &NamespacedName,
        stale: &BTreeSet<NamespacedName>,
    ) -> Result<(), Error> {
        if stale.is_empty() {
            return Ok(());
        }
        self.mutate(template, MissingTemplate::Ignore, |refs| {
            refs.retain(|r| !stale.contains(r));
        })
        .await
    }

    /// Optimistic-concurrency read-modify-write loop.
    ///
    /// Reads the template, applies `mutation` to its reference set, and
    /// writes annotation + finalizer conditioned on the resourceVersion of
    /// the read. Conflicts restart the loop with a fresh read; writes are
    /// skipped entirely when the stored state already matches.
    async fn mutate<F>(
        &self,
        template_id: &NamespacedName,
        missing: MissingTemplate,
        mutation: F,
    ) -> Result<(), Error>
    where
        F: Fn(&mut BTreeSet<NamespacedName>),
    {
        loop {
            let mut template = match self
                .store
                .get(&template_id.namespace, &template_id.name)
                .await?
            {
                Some(t) => t,
                None => {
                    return match missing {
                        MissingTemplate::Ignore => Ok(()),
                        MissingTemplate::Fail => Err(Error::template_not_found(
                            &template_id.name,
                            [template_id.namespace.as_str()],
                        )),
                    };
                }
            };

            let mut refs = parse_references(&template);
            let before = refs.clone();
            mutation(&mut refs);

            if refs == before && finalizer_consistent(&template, &refs) {
                debug!(template = %template_id, "reference set already up to date");
                return Ok(());
            }

            write_references(&mut template, &refs);

            match self.store.update(&template).await {
                Ok(_) => {
                    info!(
                        template = %template_id,
                        references = refs.len(),
                        finalizer = !refs.is_empty(),
                        "updated template reference set"
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    debug!(template = %template_id, "conflict updating template, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// How the mutation loop treats a template that does not exist
#[derive(Clone, Copy, Debug)]
enum MissingTemplate {
    /// Return Ok (reference removal against a deleted template)
    Ignore,
    /// Return a not-found error (reference addition: the template vanished
    /// between resolution and tracking)
    Fail,
}
