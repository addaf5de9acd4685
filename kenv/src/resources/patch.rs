//! Client-config rewriting.
//!
//! Webhook and CRD-conversion manifests arrive pointing at in-cluster service
//! names; these patchers rewrite them to the direct host-reachable TLS
//! endpoint and embed the issued CA bundle. URL-mode and service-mode are
//! mutually exclusive in the wire format, so the service reference is always
//! removed. Both patches are idempotent: reapplying with identical arguments
//! is a fixed point.

use serde_json::{json, Value};
use url::Url;

use crate::error::EnvResult;
use crate::resources::{display_name, WEBHOOK_CONVERT_PATH};
use crate::tree;

const PATCH_WEBHOOKS_EXPR: &str = r#"
    .webhooks |= map(
        .clientConfig.url = $0 + (.clientConfig.service.path // "/")
        | .clientConfig.caBundle = $1
        | del(.clientConfig.service)
    )
"#;

const PATCH_CONVERSION_EXPR: &str = r#"
    .spec.conversion = {
        "strategy": "Webhook",
        "webhook": {
            "conversionReviewVersions": ["v1", "v1beta1"],
            "clientConfig": {
                "url": $0,
                "caBundle": $1
            }
        }
    }
"#;

/// Patches a webhook configuration (mutating or validating) to use the given
/// base URL and CA bundle, in place.
///
/// For each webhook entry the effective path is the prior service-reference
/// path, else the path component of an existing URL, else `"/"`. The entry
/// ends up with `clientConfig.url = base_url + path`, the provided
/// `clientConfig.caBundle`, and no `clientConfig.service`.
pub fn patch_webhook_config(obj: &mut Value, base_url: &str, ca_bundle: &str) -> EnvResult<()> {
    let name = display_name(obj);

    // Entries that only carry a URL keep its path across the rewrite: the
    // path is materialized as a service path so the single map expression
    // below treats all entries uniformly.
    materialize_url_paths(obj)?;

    tree::transform(
        obj,
        PATCH_WEBHOOKS_EXPR,
        &[json!(base_url), json!(ca_bundle)],
    )
    .map_err(|e| e.with_resource(&format!("webhook config {name}")))
}

/// Copies the path component of an existing `clientConfig.url` into
/// `clientConfig.service.path` for entries that have no service reference.
fn materialize_url_paths(obj: &mut Value) -> EnvResult<()> {
    let entries: Value = tree::query(obj, ".webhooks", &[])?;
    let Value::Array(entries) = entries else {
        return Ok(());
    };

    for (index, entry) in entries.iter().enumerate() {
        let service_path: String = tree::query(entry, ".clientConfig.service.path", &[])?;
        if !service_path.is_empty() {
            continue;
        }

        let prior_url: String = tree::query(entry, ".clientConfig.url", &[])?;
        if prior_url.is_empty() {
            continue;
        }

        // An unparseable prior URL falls back to the default path.
        let Ok(parsed) = Url::parse(&prior_url) else {
            continue;
        };

        tree::transform(
            obj,
            &format!(".webhooks[{index}].clientConfig.service.path = $0"),
            &[json!(parsed.path())],
        )?;
    }

    Ok(())
}

/// Replaces a CRD's `spec.conversion` with a webhook-based conversion block
/// pointing at `base_url + "/convert"`, in place.
///
/// This is a full overwrite, not a merge: whatever conversion strategy the
/// manifest declared is discarded.
pub fn patch_crd_conversion(crd: &mut Value, base_url: &str, ca_bundle: &str) -> EnvResult<()> {
    let name = display_name(crd);

    tree::transform(
        crd,
        PATCH_CONVERSION_EXPR,
        &[
            json!(format!("{base_url}{WEBHOOK_CONVERT_PATH}")),
            json!(ca_bundle),
        ],
    )
    .map_err(|e| e.with_resource(&format!("CRD {name}")))
}
