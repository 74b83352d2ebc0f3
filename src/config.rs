//! Operator configuration
//!
//! Configuration is assembled in `main` from CLI flags and environment
//! variables, then shared with the webhook and both controllers.

use crate::{DEFAULT_TEMPLATE_NAMESPACE, DEFAULT_WEBHOOK_PORT};

/// Shared operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Shared namespace searched as the final tier when a templateRef has
    /// no explicit namespace
    pub default_template_namespace: String,

    /// Port the validating webhook server listens on
    pub webhook_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_template_namespace: DEFAULT_TEMPLATE_NAMESPACE.to_string(),
            webhook_port: DEFAULT_WEBHOOK_PORT,
        }
    }
}

impl OperatorConfig {
    /// Create a config with a custom default template namespace
    pub fn with_default_namespace(namespace: impl Into<String>) -> Self {
        Self {
            default_template_namespace: namespace.into(),
            ..Default::default()
        }
    }
}
