//! CustomResourceDefinition selection and status inspection.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::registry::GroupKind;
use crate::resources::display_name;
use crate::tree;
use crate::env_error;

/// Status condition type marking a CRD as ready to serve.
pub const ESTABLISHED_CONDITION: &str = "Established";

/// Returns the subset of CRDs whose (`spec.group`, `spec.names.kind`) is in
/// the convertible set.
///
/// A CRD missing either field is a configuration error naming the CRD and
/// the missing field, never a silent skip.
pub fn filter_convertible_crds(
    crds: &[Value],
    convertibles: &BTreeSet<GroupKind>,
) -> EnvResult<Vec<Value>> {
    let mut selected = Vec::new();

    for crd in crds {
        let group: String = tree::query(crd, ".spec.group", &[])?;
        if group.is_empty() {
            return Err(missing_field(crd, "spec.group"));
        }

        let kind: String = tree::query(crd, ".spec.names.kind", &[])?;
        if kind.is_empty() {
            return Err(missing_field(crd, "spec.names.kind"));
        }

        if convertibles.contains(&GroupKind { group, kind }) {
            selected.push(crd.clone());
        }
    }

    Ok(selected)
}

fn missing_field(crd: &Value, field: &str) -> EnvError {
    env_error!(
        ErrorKind::MissingField,
        "CRD missing required field",
        format!("CRD {}: {field}", display_name(crd))
    )
}

/// Reports whether a CRD carries the `Established` condition with status
/// `True`.
pub fn is_established(crd: &Value) -> bool {
    let conditions: Vec<Value> =
        tree::query_slice(crd, ".status.conditions", &[]).unwrap_or_default();

    conditions.iter().any(|condition| {
        let condition_type: String =
            tree::query(condition, ".type", &[]).unwrap_or_default();
        let status: String = tree::query(condition, ".status", &[]).unwrap_or_default();
        condition_type == ESTABLISHED_CONDITION && status == "True"
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn crd(name: &str, group: &str, kind: &str) -> Value {
        json!({
            "metadata": {"name": name},
            "spec": {"group": group, "names": {"kind": kind}}
        })
    }

    #[test]
    fn test_filter_selects_iff_in_set() {
        let crds = vec![
            crd("widgets.example.com", "example.com", "Widget"),
            crd("gadgets.example.com", "example.com", "Gadget"),
        ];
        let convertibles =
            BTreeSet::from([GroupKind::new("example.com", "Widget")]);

        let selected = filter_convertible_crds(&crds, &convertibles).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["metadata"]["name"], json!("widgets.example.com"));
    }

    #[test]
    fn test_missing_group_is_field_specific_error() {
        let crds = vec![json!({
            "metadata": {"name": "broken.example.com"},
            "spec": {"names": {"kind": "Broken"}}
        })];

        let err = filter_convertible_crds(&crds, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        let detail = err.detail().unwrap();
        assert!(detail.contains("broken.example.com"));
        assert!(detail.contains("spec.group"));
    }

    #[test]
    fn test_missing_kind_is_field_specific_error() {
        let crds = vec![json!({
            "metadata": {"name": "broken.example.com"},
            "spec": {"group": "example.com", "names": {}}
        })];

        let err = filter_convertible_crds(&crds, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert!(err.detail().unwrap().contains("spec.names.kind"));
    }

    #[test]
    fn test_is_established() {
        let established = json!({
            "status": {"conditions": [
                {"type": "NamesAccepted", "status": "True"},
                {"type": "Established", "status": "True"},
            ]}
        });
        assert!(is_established(&established));

        let pending = json!({
            "status": {"conditions": [{"type": "Established", "status": "False"}]}
        });
        assert!(!is_established(&pending));

        assert!(!is_established(&json!({})));
    }
}
