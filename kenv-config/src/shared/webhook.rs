use serde::{Deserialize, Serialize};

use crate::shared::PollPolicy;

/// Configuration of the host-side webhook endpoint and its readiness checks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Host name or address advertised to the cluster in rewritten
    /// client-config URLs. Must be reachable from inside the cluster.
    pub host: String,
    /// Address the readiness poller connects to; the webhook server runs on
    /// the host, so probing goes through loopback rather than the advertised
    /// address.
    pub probe_host: String,
    /// Port the webhook server listens on.
    pub port: u16,
    /// Whether newly created webhook configurations are health checked.
    pub check_readiness: bool,
    /// Timeout, in milliseconds, for a single health probe call. Nests
    /// inside the per-endpoint poll deadline.
    pub call_timeout_ms: u64,
    /// Poll policy for endpoint readiness.
    pub poll: PollPolicy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "host.docker.internal".to_string(),
            probe_host: "127.0.0.1".to_string(),
            port: 9443,
            check_readiness: true,
            call_timeout_ms: 2_000,
            poll: PollPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = WebhookConfig::default();
        assert_eq!(config.port, 9443);
        assert!(config.check_readiness);
        assert!(!config.host.is_empty());
        assert!(!config.probe_host.is_empty());
    }
}
