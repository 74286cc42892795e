use serde::{Deserialize, Serialize};

use super::OtpAlgorithm;

/// TOTP parameters offered to authenticator apps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpSettings {
    pub digits: u32,
    pub period_seconds: u64,
    pub algorithm: OtpAlgorithm,
    /// Steps accepted either side of the current one
    pub skew_periods: u32,
    /// Issuer label shown in authenticator apps
    pub issuer: String,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            digits: 6,
            period_seconds: 30,
            algorithm: OtpAlgorithm::Sha1,
            skew_periods: 1,
            issuer: "MFA Provider".to_string(),
        }
    }
}
