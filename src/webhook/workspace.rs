//! Workspace validation webhook handler
//!
//! Rejects Workspace create/update requests whose templateRef cannot be
//! resolved, with the resolver's error message passed through verbatim so
//! the requester sees which namespace(s) were searched. Transport failures
//! against the backing store deny with a retryable message; they never
//! silently allow.

use std::sync::Arc;

use axum::{extract::State, Json};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::Workspace;
use crate::resolver::{resolve, TemplateLookup};
use crate::Error;

use super::WebhookState;

/// Handle a validating admission review for Workspaces
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Workspace>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Workspace> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = validate_workspace(state.lookup.as_ref(), &state.config, &req).await;
    Json(response.into_review())
}

/// Validate a single workspace admission request.
///
/// Runs the resolver only; on success the request is admitted
/// unconditionally since resolution is re-run at reconcile time.
pub async fn validate_workspace(
    lookup: &dyn TemplateLookup,
    config: &OperatorConfig,
    request: &AdmissionRequest<Workspace>,
) -> AdmissionResponse {
    let uid = &request.uid;

    let workspace = match &request.object {
        Some(w) => w,
        None => {
            // DELETE carries no object; nothing to validate
            debug!(uid = %uid, "no workspace object in request, allowing");
            return AdmissionResponse::from(request);
        }
    };

    let namespace = match workspace
        .metadata
        .namespace
        .as_deref()
        .or(request.namespace.as_deref())
    {
        Some(ns) => ns,
        None => {
            warn!(uid = %uid, "admission request carries no namespace");
            return AdmissionResponse::from(request)
                .deny("workspace has no namespace; cannot resolve templateRef");
        }
    };

    let template_ref = &workspace.spec.template_ref;
    match resolve(
        lookup,
        template_ref,
        namespace,
        &config.default_template_namespace,
    )
    .await
    {
        Ok(resolved) => {
            info!(
                uid = %uid,
                workspace = ?workspace.metadata.name,
                template = %template_ref.name,
                resolved_namespace = %resolved.namespace,
                "template reference resolved, admitting workspace"
            );
            AdmissionResponse::from(request)
        }
        Err(e @ Error::TemplateNotFound { .. }) => {
            // Resolver message verbatim: contains `failed to get template`
            // and the namespace(s) searched
            info!(
                uid = %uid,
                workspace = ?workspace.metadata.name,
                error = %e,
                "rejecting workspace: template not resolvable"
            );
            AdmissionResponse::from(request).deny(e.to_string())
        }
        Err(e) => {
            // Backing store unreachable: deny with a retryable message
            // rather than admitting a workspace we could not verify
            error!(uid = %uid, error = %e, "template lookup failed during admission");
            AdmissionResponse::from(request).deny(format!(
                "unable to verify template reference ({e}); retry the request"
            ))
        }
    }
}
