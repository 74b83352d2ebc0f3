//! WorkspaceTemplate Custom Resource Definition
//!
//! A WorkspaceTemplate provides defaults (image, storage size) for
//! workspaces that reference it. Templates may be shared across namespaces;
//! while referenced, a template carries a protection finalizer that blocks
//! deletion until the last reference is removed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a WorkspaceTemplate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceTemplate",
    plural = "workspacetemplates",
    shortname = "wstpl",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.defaultImage"}"#,
    printcolumn = r#"{"name":"Storage","type":"string","jsonPath":".spec.defaultStorageSize"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplateSpec {
    /// Human-readable display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Default container image for workspaces using this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,

    /// Default persistent storage size (e.g. "5Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_storage_size: Option<String>,
}

impl WorkspaceTemplate {
    /// True if the deletion timestamp is set (template is pending deletion,
    /// held by finalizers)
    pub fn is_pending_deletion(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_deserializes_from_manifest_yaml() {
        let yaml = r#"
displayName: "Cross-Namespace Finalizer Test"
defaultImage: "jupyter/base-notebook:finalizer-test"
defaultStorageSize: "5Gi"
"#;
        let spec: WorkspaceTemplateSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            spec.default_image.as_deref(),
            Some("jupyter/base-notebook:finalizer-test")
        );
        assert_eq!(spec.default_storage_size.as_deref(), Some("5Gi"));
    }

    #[test]
    fn crd_has_expected_identity() {
        use kube::CustomResourceExt;
        let crd = WorkspaceTemplate::crd();
        assert_eq!(crd.spec.group, "workspace.jupyter.org");
        assert_eq!(crd.spec.names.plural, "workspacetemplates");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn pending_deletion_reflects_timestamp() {
        let mut template = WorkspaceTemplate::new("t", WorkspaceTemplateSpec::default());
        assert!(!template.is_pending_deletion());

        template.metadata.deletion_timestamp =
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                chrono::Utc::now(),
            ));
        assert!(template.is_pending_deletion());
    }
}
