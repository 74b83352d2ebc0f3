//! Controller implementations for jupyter-k8s CRDs
//!
//! This module contains the reconciliation logic for both custom resources.
//! Controllers follow the Kubernetes controller pattern with
//! observe-diff-act loops.

mod template;
mod workspace;

pub use template::{
    reconcile_template, template_error_policy, KubeWorkspaceIndex, TemplateContext, WorkspaceIndex,
};
pub use workspace::{
    error_policy, reconcile, Context, KubeWorkspaceClient, WorkspaceClient,
};
