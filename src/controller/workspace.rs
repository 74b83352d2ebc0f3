//! Workspace controller implementation
//!
//! Reconciles Workspace resources: resolves the template reference, applies
//! template defaults, records the resolved namespace as a label, and keeps
//! the template's reference set in sync. Idempotent and safe to abandon and
//! re-run at any point; all writes are either merge patches of derived
//! state or version-checked reference updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::OperatorConfig;
use crate::crd::{
    Condition, ConditionStatus, DesiredStatus, Workspace, WorkspacePhase, WorkspaceSpec,
    WorkspaceStatus, CONDITION_TEMPLATE_RESOLVED,
};
use crate::defaulting::apply_template_defaults;
use crate::reference::{KubeTemplateStore, NamespacedName, ReferenceTracker, TemplateStore};
use crate::resolver::{resolve, KubeTemplateLookup, TemplateLookup};
use crate::{Error, TEMPLATE_NAMESPACE_LABEL, TEMPLATE_REF_ANNOTATION};

/// Trait abstracting Workspace write operations
///
/// Allows mocking the Kubernetes client in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Patch the status of a Workspace
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkspaceStatus,
    ) -> Result<(), Error>;

    /// Persist the outcome of a successful resolution: defaulted spec
    /// fields, the resolved-namespace label, and the tracked-template
    /// annotation.
    async fn apply_resolution(
        &self,
        namespace: &str,
        name: &str,
        effective: &WorkspaceSpec,
        resolved_namespace: &str,
        template_id: &str,
    ) -> Result<(), Error>;
}

/// Real Workspace client implementation
pub struct KubeWorkspaceClient {
    client: Client,
}

impl KubeWorkspaceClient {
    /// Create a new client wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkspaceClient for KubeWorkspaceClient {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkspaceStatus,
    ) -> Result<(), Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply("jupyter-k8s-controller"),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }

    async fn apply_resolution(
        &self,
        namespace: &str,
        name: &str,
        effective: &WorkspaceSpec,
        resolved_namespace: &str,
        template_id: &str,
    ) -> Result<(), Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);

        let mut spec = serde_json::Map::new();
        if let Some(image) = &effective.image {
            spec.insert("image".to_string(), serde_json::json!(image));
        }
        if let Some(size) = &effective.storage_size {
            spec.insert("storageSize".to_string(), serde_json::json!(size));
        }

        let patch = serde_json::json!({
            "metadata": {
                "labels": { TEMPLATE_NAMESPACE_LABEL: resolved_namespace },
                "annotations": { TEMPLATE_REF_ANNOTATION: template_id },
            },
            "spec": spec,
        });

        api.patch(
            name,
            &PatchParams::apply("jupyter-k8s-controller"),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

/// Controller context containing shared state and clients
///
/// Shared across all reconciliation calls; holds resources that are
/// expensive to create (clients) behind trait objects for testability.
pub struct Context {
    /// Workspace write operations
    pub workspaces: Arc<dyn WorkspaceClient>,
    /// Template lookup for the resolver
    pub lookup: Arc<dyn TemplateLookup>,
    /// Reference tracker / finalizer manager
    pub tracker: ReferenceTracker,
    /// Operator configuration
    pub config: OperatorConfig,
}

impl Context {
    /// Create a production context with the given Kubernetes client
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let store: Arc<dyn TemplateStore> = Arc::new(KubeTemplateStore::new(client.clone()));
        Self {
            workspaces: Arc::new(KubeWorkspaceClient::new(client.clone())),
            lookup: Arc::new(KubeTemplateLookup::new(client)),
            tracker: ReferenceTracker::new(store),
            config,
        }
    }

    /// Create a context for testing with custom clients
    #[cfg(test)]
    pub fn for_testing(
        workspaces: Arc<dyn WorkspaceClient>,
        lookup: Arc<dyn TemplateLookup>,
        tracker: ReferenceTracker,
        config: OperatorConfig,
    ) -> Self {
        Self {
            workspaces,
            lookup,
            tracker,
            config,
        }
    }
}

/// Template identity recorded on the workspace by a previous reconcile
fn tracked_template(workspace: &Workspace) -> Option<NamespacedName> {
    workspace
        .annotations()
        .get(TEMPLATE_REF_ANNOTATION)
        .and_then(|v| NamespacedName::parse(v))
}

/// Reconcile a Workspace resource
#[instrument(skip(workspace, ctx), fields(workspace = %workspace.name_any()))]
pub async fn reconcile(workspace: Arc<Workspace>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = workspace.name_any();
    let namespace = workspace
        .namespace()
        .ok_or_else(|| Error::validation("workspace has no namespace"))?;
    let workspace_id = NamespacedName::new(&namespace, &name);

    let tracked = tracked_template(&workspace);

    if workspace.metadata.deletion_timestamp.is_some() {
        // Workspace going away: release its template reference so the
        // protection finalizer can clear. The template reconciler also
        // prunes dead references, so a miss here still converges.
        if let Some(template_id) = tracked {
            info!(template = %template_id, "workspace terminating, releasing template reference");
            ctx.tracker.remove_reference(&template_id, &workspace_id).await?;
        }
        return Ok(Action::await_change());
    }

    debug!("resolving template reference");
    let resolved = match resolve(
        ctx.lookup.as_ref(),
        &workspace.spec.template_ref,
        &namespace,
        &ctx.config.default_template_namespace,
    )
    .await
    {
        Ok(resolved) => resolved,
        Err(e @ Error::TemplateNotFound { .. }) => {
            // Admission normally prevents this, but the template may have
            // been deleted since, or the spec updated. Surface on status
            // and retry with a fixed delay rather than crash-looping.
            warn!(error = %e, "template resolution failed");
            let status = WorkspaceStatus::with_phase(WorkspacePhase::Failed)
                .message(e.to_string())
                .condition(Condition::new(
                    CONDITION_TEMPLATE_RESOLVED,
                    ConditionStatus::False,
                    "TemplateNotFound",
                    e.to_string(),
                ));
            ctx.workspaces.patch_status(&namespace, &name, &status).await?;
            return Ok(Action::requeue(Duration::from_secs(30)));
        }
        // Transient store errors go through error_policy backoff
        Err(e) => return Err(e),
    };

    let template_id = NamespacedName::new(&resolved.namespace, &workspace.spec.template_ref.name);

    // A spec update may have re-resolved to a different template; release
    // the old reference before registering the new one
    if let Some(prior) = tracked {
        if prior != template_id {
            info!(old = %prior, new = %template_id, "template reference moved");
            ctx.tracker.remove_reference(&prior, &workspace_id).await?;
        }
    }

    let (effective, spec_changed) =
        apply_template_defaults(&workspace.spec, &resolved.template.spec);

    let label_current = workspace.labels().get(TEMPLATE_NAMESPACE_LABEL)
        == Some(&resolved.namespace);
    let template_id_str = template_id.to_string();
    let annotation_current =
        workspace.annotations().get(TEMPLATE_REF_ANNOTATION) == Some(&template_id_str);

    if spec_changed || !label_current || !annotation_current {
        info!(
            resolved_namespace = %resolved.namespace,
            defaulted = spec_changed,
            "persisting resolved template outcome"
        );
        ctx.workspaces
            .apply_resolution(
                &namespace,
                &name,
                &effective,
                &resolved.namespace,
                &template_id_str,
            )
            .await?;
    }

    ctx.tracker
        .ensure_reference(&template_id, &workspace_id)
        .await?;

    let phase = match effective.desired_status {
        DesiredStatus::Running => WorkspacePhase::Running,
        DesiredStatus::Stopped => WorkspacePhase::Stopped,
    };
    let status = WorkspaceStatus::with_phase(phase)
        .resolved_from(&resolved.namespace)
        .condition(Condition::new(
            CONDITION_TEMPLATE_RESOLVED,
            ConditionStatus::True,
            "Resolved",
            format!(
                "template {} resolved from namespace {}",
                workspace.spec.template_ref.name, resolved.namespace
            ),
        ));
    ctx.workspaces.patch_status(&namespace, &name, &status).await?;

    Ok(Action::requeue(Duration::from_secs(300)))
}

/// Error policy for the workspace controller
///
/// Called when reconciliation fails with a transient error; requeues with a
/// short delay.
pub fn error_policy(workspace: Arc<Workspace>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        workspace = %workspace.name_any(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        OwnershipType, TemplateRef, WorkspaceTemplate, WorkspaceTemplateSpec,
    };
    use crate::reference::test_store::FakeTemplateStore;
    use crate::reference::parse_references;
    use crate::resolver::MockTemplateLookup;
    use crate::TEMPLATE_PROTECTION_FINALIZER;
    use mockall::predicate::{always, eq};

    const SHARED_NS: &str = "jupyter-k8s-shared";

    fn workspace(namespace: &str, name: &str, template: &str, template_ns: Option<&str>) -> Workspace {
        let mut ws = Workspace::new(
            name,
            WorkspaceSpec {
                display_name: Some("Test".into()),
                template_ref: TemplateRef {
                    name: template.into(),
                    namespace: template_ns.map(String::from),
                },
                image: None,
                storage_size: None,
                desired_status: DesiredStatus::Running,
                ownership_type: OwnershipType::Public,
            },
        );
        ws.metadata.namespace = Some(namespace.to_string());
        ws
    }

    fn template_with_image(name: &str, image: &str) -> WorkspaceTemplate {
        WorkspaceTemplate::new(
            name,
            WorkspaceTemplateSpec {
                display_name: None,
                default_image: Some(image.to_string()),
                default_storage_size: Some("5Gi".to_string()),
            },
        )
    }

    fn context(
        workspaces: MockWorkspaceClient,
        lookup: MockTemplateLookup,
        store: Arc<FakeTemplateStore>,
    ) -> Arc<Context> {
        Arc::new(Context::for_testing(
            Arc::new(workspaces),
            Arc::new(lookup),
            ReferenceTracker::new(store),
            OperatorConfig::default(),
        ))
    }

    /// Scenario: workspace in team-a, empty templateRef namespace, template
    /// in team-a. Defaults applied, label recorded, reference registered.
    #[tokio::test]
    async fn reconcile_resolves_defaults_and_tracks() {
        let mut lookup = MockTemplateLookup::new();
        lookup
            .expect_get_template()
            .with(eq("team-a"), eq("basic-template"))
            .returning(|_, _| {
                Ok(Some(template_with_image(
                    "basic-template",
                    "jupyter/base-notebook:team-a",
                )))
            });

        let mut workspaces = MockWorkspaceClient::new();
        workspaces
            .expect_apply_resolution()
            .withf(|ns, name, effective, resolved_ns, template_id| {
                ns == "team-a"
                    && name == "ws-1"
                    && effective.image.as_deref() == Some("jupyter/base-notebook:team-a")
                    && effective.storage_size.as_deref() == Some("5Gi")
                    && resolved_ns == "team-a"
                    && template_id == "team-a/basic-template"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        workspaces
            .expect_patch_status()
            .withf(|_, _, status| {
                status.phase == WorkspacePhase::Running
                    && status.resolved_template_namespace.as_deref() == Some("team-a")
                    && status.conditions.iter().any(|c| {
                        c.type_ == CONDITION_TEMPLATE_RESOLVED && c.status == ConditionStatus::True
                    })
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(FakeTemplateStore::new());
        store.insert(
            "team-a",
            "basic-template",
            template_with_image("basic-template", "jupyter/base-notebook:team-a"),
        );

        let ctx = context(workspaces, lookup, store.clone());
        let action = reconcile(Arc::new(workspace("team-a", "ws-1", "basic-template", None)), ctx)
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(300)));

        let template = store.current("team-a", "basic-template").unwrap();
        assert_eq!(
            parse_references(&template),
            [NamespacedName::new("team-a", "ws-1")].into()
        );
        assert!(template
            .metadata
            .finalizers
            .unwrap()
            .contains(&TEMPLATE_PROTECTION_FINALIZER.to_string()));
    }

    /// Resolution failure surfaces a status condition and requeues instead
    /// of crash-looping
    #[tokio::test]
    async fn reconcile_surfaces_resolution_failure() {
        let mut lookup = MockTemplateLookup::new();
        lookup.expect_get_template().returning(|_, _| Ok(None));

        let mut workspaces = MockWorkspaceClient::new();
        workspaces
            .expect_patch_status()
            .withf(|_, _, status| {
                status.phase == WorkspacePhase::Failed
                    && status
                        .message
                        .as_deref()
                        .is_some_and(|m| m.contains("failed to get template"))
                    && status.conditions.iter().any(|c| {
                        c.type_ == CONDITION_TEMPLATE_RESOLVED && c.status == ConditionStatus::False
                    })
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(FakeTemplateStore::new());
        let ctx = context(workspaces, lookup, store);

        let action = reconcile(
            Arc::new(workspace("team-a", "ws-1", "nonexistent-template", None)),
            ctx,
        )
        .await
        .unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }

    /// Transient store errors propagate to error_policy rather than being
    /// recorded as terminal failures
    #[tokio::test]
    async fn reconcile_propagates_transient_errors() {
        let mut lookup = MockTemplateLookup::new();
        lookup.expect_get_template().returning(|_, _| {
            Err(Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".into(),
                message: "timeout".into(),
                reason: "Timeout".into(),
                code: 504,
            })))
        });

        let workspaces = MockWorkspaceClient::new();
        let store = Arc::new(FakeTemplateStore::new());
        let ctx = context(workspaces, lookup, store);

        let err = reconcile(
            Arc::new(workspace("team-a", "ws-1", "basic-template", None)),
            ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Kube(_)));
    }

    /// A terminating workspace releases its tracked template reference
    #[tokio::test]
    async fn reconcile_releases_reference_on_deletion() {
        let store = Arc::new(FakeTemplateStore::new());
        store.insert(
            SHARED_NS,
            "shared-template",
            template_with_image("shared-template", "jupyter/base-notebook:shared"),
        );

        let tracker = ReferenceTracker::new(store.clone() as Arc<dyn TemplateStore>);
        let template_id = NamespacedName::new(SHARED_NS, "shared-template");
        let ws_id = NamespacedName::new("team-a", "ws-1");
        tracker.ensure_reference(&template_id, &ws_id).await.unwrap();

        let mut ws = workspace("team-a", "ws-1", "shared-template", Some(SHARED_NS));
        ws.metadata.deletion_timestamp =
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                chrono::Utc::now(),
            ));
        ws.metadata.annotations = Some(
            [(
                TEMPLATE_REF_ANNOTATION.to_string(),
                format!("{SHARED_NS}/shared-template"),
            )]
            .into(),
        );

        let ctx = Arc::new(Context::for_testing(
            Arc::new(MockWorkspaceClient::new()),
            Arc::new(MockTemplateLookup::new()),
            ReferenceTracker::new(store.clone()),
            OperatorConfig::default(),
        ));

        let action = reconcile(Arc::new(ws), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());

        let template = store.current(SHARED_NS, "shared-template").unwrap();
        assert!(parse_references(&template).is_empty());
        assert!(template.metadata.finalizers.is_none());
    }

    /// Re-resolution to a different template moves the reference
    #[tokio::test]
    async fn reconcile_moves_reference_on_template_change() {
        let store = Arc::new(FakeTemplateStore::new());
        store.insert(
            "team-a",
            "old-template",
            template_with_image("old-template", "jupyter/base-notebook:old"),
        );
        store.insert(
            "team-a",
            "new-template",
            template_with_image("new-template", "jupyter/base-notebook:new"),
        );

        let tracker = ReferenceTracker::new(store.clone() as Arc<dyn TemplateStore>);
        let ws_id = NamespacedName::new("team-a", "ws-1");
        tracker
            .ensure_reference(&NamespacedName::new("team-a", "old-template"), &ws_id)
            .await
            .unwrap();

        let mut lookup = MockTemplateLookup::new();
        lookup
            .expect_get_template()
            .with(eq("team-a"), eq("new-template"))
            .returning(|_, _| {
                Ok(Some(template_with_image(
                    "new-template",
                    "jupyter/base-notebook:new",
                )))
            });

        let mut workspaces = MockWorkspaceClient::new();
        workspaces
            .expect_apply_resolution()
            .with(always(), always(), always(), always(), eq("team-a/new-template"))
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        workspaces
            .expect_patch_status()
            .returning(|_, _, _| Ok(()));

        let mut ws = workspace("team-a", "ws-1", "new-template", None);
        ws.metadata.annotations = Some(
            [(
                TEMPLATE_REF_ANNOTATION.to_string(),
                "team-a/old-template".to_string(),
            )]
            .into(),
        );

        let ctx = context(workspaces, lookup, store.clone());
        reconcile(Arc::new(ws), ctx).await.unwrap();

        let old = store.current("team-a", "old-template").unwrap();
        assert!(parse_references(&old).is_empty());
        assert!(old.metadata.finalizers.is_none());

        let new = store.current("team-a", "new-template").unwrap();
        assert_eq!(parse_references(&new), [ws_id].into());
    }
}
