//! jupyter-k8s - Kubernetes operator for Jupyter workspaces
//!
//! The operator manages two namespaced custom resources: Workspace and
//! WorkspaceTemplate. A Workspace references a WorkspaceTemplate by name,
//! optionally across namespaces; the operator resolves that reference,
//! applies the template's defaults to the workspace spec, and protects
//! in-use templates from deletion with a finalizer.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (Workspace, WorkspaceTemplate)
//! - [`resolver`] - Tiered cross-namespace template resolution
//! - [`defaulting`] - Template default application to workspace specs
//! - [`reference`] - Template reference tracking and finalizer management
//! - [`webhook`] - Validating admission webhook for Workspace create/update
//! - [`controller`] - Reconciliation loops for both resources
//! - [`config`] - Operator configuration
//! - [`retry`] - Retry with backoff for transient API failures
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod defaulting;
pub mod error;
pub mod reference;
pub mod resolver;
pub mod retry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Well-Known Identifiers
// =============================================================================
// These strings are part of the operator's external contract: they appear on
// stored objects and are matched by clients and tests. Changing any of them
// is a breaking change for existing clusters.

/// API group for all jupyter-k8s custom resources
pub const API_GROUP: &str = "workspace.jupyter.org";

/// Finalizer placed on a WorkspaceTemplate while any workspace references it.
///
/// The apiserver holds template deletion until this finalizer is removed,
/// which happens only once the reference set is empty.
pub const TEMPLATE_PROTECTION_FINALIZER: &str = "workspace.jupyter.org/template-protection";

/// Label set on a Workspace recording the namespace its template was
/// resolved from (the workspace's own namespace or the shared namespace).
pub const TEMPLATE_NAMESPACE_LABEL: &str = "workspace.jupyter.org/template-namespace";

/// Annotation on a Workspace recording the `namespace/name` of the template
/// the reference tracker last registered for it. Used to drop the old
/// reference when a spec update re-resolves to a different template.
pub const TEMPLATE_REF_ANNOTATION: &str = "workspace.jupyter.org/template-ref";

/// Annotation on a WorkspaceTemplate holding the reverse index of
/// referencing workspaces (sorted, comma-separated `namespace/name` list).
pub const REFERENCED_BY_ANNOTATION: &str = "workspace.jupyter.org/referenced-by";

/// Default shared namespace searched when a templateRef has no explicit
/// namespace and the workspace's own namespace has no matching template.
pub const DEFAULT_TEMPLATE_NAMESPACE: &str = "jupyter-k8s-shared";

/// Default port for the validating webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
