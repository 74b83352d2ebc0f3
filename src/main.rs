//! jupyter-k8s Operator - Jupyter workspace lifecycle management

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jupyter_k8s::config::OperatorConfig;
use jupyter_k8s::controller::{
    error_policy, reconcile, reconcile_template, template_error_policy, Context, TemplateContext,
};
use jupyter_k8s::crd::{Workspace, WorkspaceTemplate};
use jupyter_k8s::retry::{retry_with_backoff, RetryConfig};
use jupyter_k8s::webhook::{webhook_router, WebhookState};
use jupyter_k8s::{DEFAULT_TEMPLATE_NAMESPACE, DEFAULT_WEBHOOK_PORT};

/// jupyter-k8s - Kubernetes operator for Jupyter workspaces
#[derive(Parser, Debug)]
#[command(name = "jupyter-k8s-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Shared namespace searched as the final template resolution tier
    #[arg(
        long,
        env = "JUPYTER_K8S_DEFAULT_TEMPLATE_NAMESPACE",
        default_value = DEFAULT_TEMPLATE_NAMESPACE
    )]
    default_template_namespace: String,

    /// Port for the validating webhook server
    #[arg(long, env = "JUPYTER_K8S_WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    webhook_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let workspace_crd = serde_yaml::to_string(&Workspace::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize Workspace CRD: {}", e))?;
        let template_crd = serde_yaml::to_string(&WorkspaceTemplate::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize WorkspaceTemplate CRD: {}", e))?;
        println!("{workspace_crd}---\n{template_crd}");
        return Ok(());
    }

    let config = OperatorConfig {
        default_template_namespace: cli.default_template_namespace,
        webhook_port: cli.webhook_port,
    };

    info!(
        default_template_namespace = %config.default_template_namespace,
        webhook_port = config.webhook_port,
        "starting jupyter-k8s operator"
    );

    let client = Client::try_default().await?;

    ensure_crds_installed(&client).await?;

    // Validating webhook (TLS termination happens in front of this server)
    let webhook_state = Arc::new(WebhookState::new(client.clone(), config.clone()));
    let router = webhook_router(webhook_state);
    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.webhook_port)).await?;
    let webhook_server = async move {
        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("webhook server failed: {}", e))
    };

    // Workspace controller
    let workspace_ctx = Arc::new(Context::new(client.clone(), config.clone()));
    let workspace_controller = Controller::new(
        Api::<Workspace>::all(client.clone()),
        WatcherConfig::default(),
    )
    .run(reconcile, error_policy, workspace_ctx)
    .for_each(|result| async move {
        match result {
            Ok((object, _)) => debug!(workspace = %object.name, "reconciled"),
            Err(e) => warn!(error = %e, "workspace reconcile failed"),
        }
    });

    // WorkspaceTemplate controller
    let template_ctx = Arc::new(TemplateContext::new(client.clone()));
    let template_controller = Controller::new(
        Api::<WorkspaceTemplate>::all(client.clone()),
        WatcherConfig::default(),
    )
    .run(reconcile_template, template_error_policy, template_ctx)
    .for_each(|result| async move {
        match result {
            Ok((object, _)) => debug!(template = %object.name, "reconciled"),
            Err(e) => warn!(error = %e, "template reconcile failed"),
        }
    });

    tokio::select! {
        result = webhook_server => result?,
        _ = workspace_controller => {},
        _ = template_controller => {},
    }

    Ok(())
}

/// Ensure both CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so CRD versions always match the operator version. Transient apiserver
/// failures during startup are retried with backoff.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("jupyter-k8s-controller").force();
    let retry = RetryConfig::with_max_attempts(5);

    info!("installing Workspace CRD");
    retry_with_backoff(&retry, "install_workspace_crd", || async {
        let patch = Patch::Apply(Workspace::crd());
        crds.patch("workspaces.workspace.jupyter.org", &params, &patch)
            .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Workspace CRD: {}", e))?;

    info!("installing WorkspaceTemplate CRD");
    retry_with_backoff(&retry, "install_workspacetemplate_crd", || async {
        let patch = Patch::Apply(WorkspaceTemplate::crd());
        crds.patch("workspacetemplates.workspace.jupyter.org", &params, &patch)
            .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install WorkspaceTemplate CRD: {}", e))?;

    info!("all jupyter-k8s CRDs installed");
    Ok(())
}
