//! Webhook configuration wrappers and endpoint extraction.

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::resources::{display_name, MUTATING_WEBHOOK_KIND, VALIDATING_WEBHOOK_KIND};
use crate::tree;
use crate::env_error;

/// The two admission webhook configuration kinds.
///
/// Modeled as a closed variant so every consumer matches exhaustively; there
/// is no open-ended probing of manifest types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookKind {
    Mutating,
    Validating,
}

impl WebhookKind {
    /// The manifest `kind` string for this webhook configuration.
    pub fn config_kind(&self) -> &'static str {
        match self {
            WebhookKind::Mutating => MUTATING_WEBHOOK_KIND,
            WebhookKind::Validating => VALIDATING_WEBHOOK_KIND,
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookKind::Mutating => write!(f, "mutating"),
            WebhookKind::Validating => write!(f, "validating"),
        }
    }
}

/// A webhook configuration manifest tagged with its kind.
#[derive(Clone, Debug)]
pub struct WebhookConfiguration {
    pub kind: WebhookKind,
    pub object: Value,
}

impl WebhookConfiguration {
    pub fn new(kind: WebhookKind, object: Value) -> Self {
        Self { kind, object }
    }

    pub fn name(&self) -> String {
        display_name(&self.object)
    }

    /// Identity used when attributing failures to this configuration.
    pub fn resource_id(&self) -> String {
        format!("{} webhook config {}", self.kind, self.name())
    }
}

/// The post-patch endpoints of one webhook configuration. Each URL must
/// independently pass a health probe before the configuration counts as
/// ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEndpointRef {
    pub name: String,
    pub kind: WebhookKind,
    pub urls: Vec<String>,
}

/// Extracts every client-config URL from a patched webhook configuration.
///
/// Entries without a URL are skipped; a malformed URL is a reported error
/// naming the owning webhook configuration and its kind.
pub fn extract_endpoint_urls(config: &WebhookConfiguration) -> EnvResult<WebhookEndpointRef> {
    let urls: Vec<String> =
        tree::query_slice(&config.object, "[.webhooks[].clientConfig.url]", &[])
            .map_err(|e| e.with_resource(&config.resource_id()))?;

    for url in &urls {
        if let Err(e) = Url::parse(url) {
            return Err(env_error!(
                ErrorKind::InvalidUrl,
                "invalid webhook client-config URL",
                format!("{}: {url}: {e}", config.resource_id())
            ));
        }
    }

    Ok(WebhookEndpointRef {
        name: config.name(),
        kind: config.kind,
        urls,
    })
}
