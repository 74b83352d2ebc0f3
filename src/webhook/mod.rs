//! Validating Admission Webhook
//!
//! Synchronous gate on Workspace create/update. The webhook runs the
//! template resolver only: defaulting and reference tracking happen after
//! admission, in the reconciler. Admission is fail-fast, not the system of
//! record; resolution is re-run at reconcile time.

pub mod workspace;

use std::sync::Arc;

use axum::{routing::post, Router};
use kube::Client;

use crate::config::OperatorConfig;
use crate::resolver::{KubeTemplateLookup, TemplateLookup};

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Template lookup used by the resolver
    pub lookup: Arc<dyn TemplateLookup>,
    /// Operator configuration (default template namespace)
    pub config: OperatorConfig,
}

impl WebhookState {
    /// Create webhook state backed by the Kubernetes API
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            lookup: Arc::new(KubeTemplateLookup::new(client)),
            config,
        }
    }
}

/// Create the webhook router with all validation endpoints
///
/// Currently supports:
/// - POST /validate/workspaces - Validate Workspace templateRef resolution
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate/workspaces", post(workspace::validate_handler))
        .with_state(state)
}
