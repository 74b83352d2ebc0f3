//! Template default application
//!
//! Merges a resolved template's defaults into a workspace spec. Fields the
//! user set explicitly are never overwritten; only unset fields receive the
//! template's default. Pure: the reconciler persists the result.

use crate::crd::{WorkspaceSpec, WorkspaceTemplateSpec};

/// Compute the effective workspace spec with template defaults applied.
///
/// Returns the effective spec and whether anything changed; an unchanged
/// spec lets the reconciler skip the write.
pub fn apply_template_defaults(
    spec: &WorkspaceSpec,
    template: &WorkspaceTemplateSpec,
) -> (WorkspaceSpec, bool) {
    let mut effective = spec.clone();
    let mut changed = false;

    if effective.image.is_none() {
        if let Some(image) = &template.default_image {
            effective.image = Some(image.clone());
            changed = true;
        }
    }

    if effective.storage_size.is_none() {
        if let Some(size) = &template.default_storage_size {
            effective.storage_size = Some(size.clone());
            changed = true;
        }
    }

    (effective, changed)
}
