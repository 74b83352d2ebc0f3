//! Workspace Custom Resource Definition
//!
//! A Workspace is a user-facing Jupyter environment. Its spec references a
//! WorkspaceTemplate (possibly in another namespace) whose defaults are
//! merged into the spec at reconcile time.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, DesiredStatus, OwnershipType, TemplateRef, WorkspacePhase};

/// Specification for a Workspace
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces",
    shortname = "ws",
    status = "WorkspaceStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Template","type":"string","jsonPath":".spec.templateRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Human-readable display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Reference to the WorkspaceTemplate providing defaults
    pub template_ref: TemplateRef,

    /// Container image. Defaulted from the template's `defaultImage` when
    /// unset; never overwritten when set explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Persistent storage size (e.g. "10Gi"). Defaulted from the template's
    /// `defaultStorageSize` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    /// Desired running state
    #[serde(default)]
    pub desired_status: DesiredStatus,

    /// Ownership model
    #[serde(default)]
    pub ownership_type: OwnershipType,
}

/// Status for a Workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: WorkspacePhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the workspace state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Namespace the template was actually resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_template_namespace: Option<String>,
}

impl WorkspaceStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: WorkspacePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the resolved template namespace and return self for chaining
    pub fn resolved_from(mut self, namespace: impl Into<String>) -> Self {
        self.resolved_template_namespace = Some(namespace.into());
        self
    }

    /// Add a condition, replacing any existing condition of the same type
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }
}
