//! Supporting types for the Workspace and WorkspaceTemplate CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference from a Workspace to a WorkspaceTemplate
///
/// The namespace is optional. When empty, resolution searches the
/// workspace's own namespace first and falls back to the configured shared
/// namespace. When set, only that namespace is searched.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TemplateRef {
    /// Name of the referenced WorkspaceTemplate
    pub name: String,

    /// Namespace of the referenced WorkspaceTemplate. Empty or absent means
    /// tiered resolution (workspace namespace, then shared namespace).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl TemplateRef {
    /// The explicit namespace, if one is set and non-empty.
    ///
    /// An empty string in YAML is treated the same as an absent field.
    pub fn explicit_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

/// Desired running state of a workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DesiredStatus {
    /// The workspace should be running
    #[default]
    Running,
    /// The workspace should be stopped
    Stopped,
}

impl std::fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Ownership model for a workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum OwnershipType {
    /// Accessible to all users in the namespace
    #[default]
    Public,
    /// Accessible only to the owning user
    Private,
}

/// Observed lifecycle phase of a workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum WorkspacePhase {
    /// Not yet reconciled
    #[default]
    Pending,
    /// Template resolved, defaults applied, reference registered
    Running,
    /// Desired status is Stopped
    Stopped,
    /// Reconciliation failed (see conditions)
    Failed,
}

/// Condition status values (True/False/Unknown)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition state cannot be determined
    Unknown,
}

/// A condition describing one aspect of workspace state
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "TemplateResolved")
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// When the condition last changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition with the transition time set to now
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Condition type set by the workspace reconciler after template resolution
pub const CONDITION_TEMPLATE_RESOLVED: &str = "TemplateResolved";
