//! Custom Resource Definitions for jupyter-k8s
//!
//! This module contains all CRD definitions used by the operator.

mod template;
mod types;
mod workspace;

pub use template::{WorkspaceTemplate, WorkspaceTemplateSpec};
pub use types::{
    Condition, ConditionStatus, DesiredStatus, OwnershipType, TemplateRef, WorkspacePhase,
    CONDITION_TEMPLATE_RESOLVED,
};
pub use workspace::{Workspace, WorkspaceSpec, WorkspaceStatus};
