//! Error types for the jupyter-k8s operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Template resolution failed in every namespace tier that was searched.
    ///
    /// The message format is part of the admission contract: clients match
    /// on the `failed to get template` substring and on the namespaces
    /// listed after it.
    #[error("failed to get template \"{name}\": not found in namespace(s): {}", tried.join(", "))]
    TemplateNotFound {
        /// Name of the template that could not be found
        name: String,
        /// Namespaces searched, in resolution order
        tried: Vec<String>,
    },

    /// Validation error for CRD specs or admission requests
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a template-not-found error listing the namespaces searched
    pub fn template_not_found(
        name: impl Into<String>,
        tried: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::TemplateNotFound {
            name: name.into(),
            tried: tried.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True if this is an optimistic-concurrency conflict (HTTP 409).
    ///
    /// Conflicts are never surfaced: callers re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }

    /// True if this wraps a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}
