//! Challenge cache settings

use serde::{Deserialize, Serialize};

/// Lifetime of issued ceremony options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    pub expiry_seconds: u64,
    /// Minimum time between sweeps of abandoned sessions
    pub cleanup_interval_seconds: u64,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            expiry_seconds: 300,
            cleanup_interval_seconds: 60,
        }
    }
}

impl ChallengeSettings {
    #[must_use]
    pub fn expiry(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.expiry_seconds)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_seconds)
    }
}
