//! WorkspaceTemplate controller implementation
//!
//! Templates have no resolution work of their own; the reconciler's job is
//! convergence of the reference set. Workspaces carry no finalizer from
//! this subsystem, so a workspace can disappear without its reconciler
//! releasing the template reference. This loop prunes references whose
//! workspace is gone or terminating, and thereby removes the protection
//! finalizer once the last referencing workspace is gone, letting any
//! pending deletion complete.
//!
//! A set deletion timestamp does not short-circuit anything here: pruning
//! keeps running during the pendingDeletion window, which is exactly when
//! it matters.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Workspace, WorkspaceTemplate};
use crate::reference::{KubeTemplateStore, NamespacedName, ReferenceTracker, TemplateStore};
use crate::reference::parse_references;
use crate::Error;

/// Trait abstracting workspace reads for reference pruning
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceIndex: Send + Sync {
    /// Get a workspace by namespace and name, or None if it does not exist
    async fn get_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workspace>, Error>;
}

/// Real workspace index backed by the Kubernetes API
pub struct KubeWorkspaceIndex {
    client: Client,
}

impl KubeWorkspaceIndex {
    /// Create an index wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkspaceIndex for KubeWorkspaceIndex {
    async fn get_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Workspace>, Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Controller context for the template reconciler
pub struct TemplateContext {
    /// Workspace reads for liveness checks
    pub workspaces: Arc<dyn WorkspaceIndex>,
    /// Reference tracker for pruning
    pub tracker: ReferenceTracker,
}

impl TemplateContext {
    /// Create a production context with the given Kubernetes client
    pub fn new(client: Client) -> Self {
        let store: Arc<dyn TemplateStore> = Arc::new(KubeTemplateStore::new(client.clone()));
        Self {
            workspaces: Arc::new(KubeWorkspaceIndex::new(client)),
            tracker: ReferenceTracker::new(store),
        }
    }

    /// Create a context for testing with custom clients
    #[cfg(test)]
    pub fn for_testing(workspaces: Arc<dyn WorkspaceIndex>, tracker: ReferenceTracker) -> Self {
        Self {
            workspaces,
            tracker,
        }
    }
}

/// Reconcile a WorkspaceTemplate resource
#[instrument(skip(template, ctx), fields(template = %template.name_any()))]
pub async fn reconcile_template(
    template: Arc<WorkspaceTemplate>,
    ctx: Arc<TemplateContext>,
) -> Result<Action, Error> {
    let name = template.name_any();
    let namespace = template
        .namespace()
        .ok_or_else(|| Error::validation("template has no namespace"))?;
    let template_id = NamespacedName::new(&namespace, &name);

    let refs = parse_references(&template);
    if refs.is_empty() {
        debug!("template unreferenced, nothing to prune");
        return Ok(Action::requeue(Duration::from_secs(300)));
    }

    let mut stale = BTreeSet::new();
    for reference in &refs {
        let live = matches!(
            ctx.workspaces
                .get_workspace(&reference.namespace, &reference.name)
                .await?,
            Some(ws) if ws.metadata.deletion_timestamp.is_none()
        );
        if !live {
            stale.insert(reference.clone());
        }
    }

    if !stale.is_empty() {
        info!(
            stale = stale.len(),
            total = refs.len(),
            pending_deletion = template.is_pending_deletion(),
            "pruning references to departed workspaces"
        );
        ctx.tracker.remove_references(&template_id, &stale).await?;
    }

    // Poll faster while a deletion is being held by the finalizer
    let requeue = if template.is_pending_deletion() {
        Duration::from_secs(30)
    } else {
        Duration::from_secs(300)
    };
    Ok(Action::requeue(requeue))
}

/// Error policy for the template controller
pub fn template_error_policy(
    template: Arc<WorkspaceTemplate>,
    error: &Error,
    _ctx: Arc<TemplateContext>,
) -> Action {
    error!(
        ?error,
        template = %template.name_any(),
        "template reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
