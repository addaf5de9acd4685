//! Manifest inspection and rewriting.
//!
//! Manifests are untyped [`serde_json::Value`] trees as decoded from YAML by
//! the loading layer. This module provides the helpers shared by the patcher
//! and the orchestrator, plus the per-resource-kind submodules.

mod crd;
mod patch;
mod webhook;

pub use crd::*;
pub use patch::*;
pub use webhook::*;

use serde_json::Value;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::tree;
use crate::env_error;

/// API group/version of CustomResourceDefinitions.
pub const CRD_API_VERSION: &str = "apiextensions.k8s.io/v1";
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// API group/version of admission webhook configurations.
pub const ADMISSION_API_VERSION: &str = "admissionregistration.k8s.io/v1";
pub const MUTATING_WEBHOOK_KIND: &str = "MutatingWebhookConfiguration";
pub const VALIDATING_WEBHOOK_KIND: &str = "ValidatingWebhookConfiguration";

/// Path appended to the base URL for CRD conversion requests.
pub const WEBHOOK_CONVERT_PATH: &str = "/convert";

/// Returns the manifest's `metadata.name`, or a [`ErrorKind::MissingField`]
/// error when absent.
pub fn object_name(manifest: &Value) -> EnvResult<String> {
    let name: String = tree::query(manifest, ".metadata.name", &[])?;
    if name.is_empty() {
        bail_missing_field(manifest, "metadata.name")?;
    }
    Ok(name)
}

/// Returns the manifest's `metadata.name` for error attribution, without
/// failing when it is absent.
pub fn display_name(manifest: &Value) -> String {
    tree::query::<String>(manifest, ".metadata.name", &[])
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Returns the manifest's `kind`, or an empty string when absent.
pub fn object_kind(manifest: &Value) -> String {
    tree::query::<String>(manifest, ".kind", &[]).unwrap_or_default()
}

fn bail_missing_field(manifest: &Value, field: &str) -> EnvResult<()> {
    Err(env_error!(
        ErrorKind::MissingField,
        "manifest missing required field",
        format!("{} {}: {field}", object_kind(manifest), display_name(manifest))
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_object_name_present() {
        let manifest = json!({"metadata": {"name": "my-webhook"}});
        assert_eq!(object_name(&manifest).unwrap(), "my-webhook");
    }

    #[test]
    fn test_object_name_missing_is_reported() {
        let manifest = json!({"kind": "CustomResourceDefinition", "metadata": {}});
        let err = object_name(&manifest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert!(err.detail().unwrap().contains("metadata.name"));
    }

    #[test]
    fn test_display_name_tolerates_missing() {
        assert_eq!(display_name(&json!({})), "<unnamed>");
    }
}
