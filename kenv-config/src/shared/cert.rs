use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration of the per-environment certificate bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertConfig {
    /// Directory the PEM artifacts are written to. When unset, a fresh
    /// per-environment directory is created under the system temp dir and
    /// removed at teardown.
    pub dir: Option<PathBuf>,
    /// Certificate validity in seconds.
    pub validity_secs: u64,
    /// Subject alternative names for the leaf certificate. When unset, the
    /// built-in list covering the common host-gateway topologies is used.
    pub sans: Option<Vec<String>>,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            dir: None,
            // One day: an environment never outlives a test run.
            validity_secs: 24 * 60 * 60,
            sans: None,
        }
    }
}
