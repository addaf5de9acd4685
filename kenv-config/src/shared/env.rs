use serde::{Deserialize, Serialize};

use crate::shared::{CertConfig, PollPolicy, WebhookConfig};

/// Top-level configuration of a webhook bootstrap environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Webhook endpoint and readiness settings.
    pub webhook: WebhookConfig,
    /// Certificate issuance settings.
    pub cert: CertConfig,
    /// Poll policy for CRD establishment waits.
    pub crd_poll: PollPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_serde() {
        let config = EnvConfig::default();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: EnvConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.webhook.port, config.webhook.port);
        assert_eq!(decoded.cert.validity_secs, config.cert.validity_secs);
    }
}
