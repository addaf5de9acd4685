use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Floor, in milliseconds, applied to the poll interval to prevent tight
/// loops when a configuration asks for an implausibly small value.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Polling policy for readiness waits.
///
/// The timeout bounds the wait per endpoint or resource, not cumulatively
/// across all of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Interval, in milliseconds, between successive attempts.
    pub interval_ms: u64,
    /// Maximum time, in milliseconds, to wait per endpoint or resource.
    pub timeout_ms: u64,
}

impl PollPolicy {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
        }
    }

    /// The effective interval, clamped to [`MIN_POLL_INTERVAL_MS`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// The per-endpoint/per-resource deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_has_a_floor() {
        let policy = PollPolicy::new(0, 1_000);
        assert_eq!(policy.interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));

        let policy = PollPolicy::new(250, 1_000);
        assert_eq!(policy.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_round_trips_through_serde() {
        let policy = PollPolicy::default();
        let encoded = serde_json::to_string(&policy).unwrap();
        let decoded: PollPolicy = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.interval_ms, policy.interval_ms);
        assert_eq!(decoded.timeout_ms, policy.timeout_ms);
    }
}
