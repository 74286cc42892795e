//! `WebAuthn` settings
//!
//! Relying party identity, the options offered to clients and the policy
//! knobs the verifiers apply.

use serde::{Deserialize, Serialize};

use super::client_data::OriginPolicy;
use super::cose::CoseAlgorithm;
use super::errors::VerifyError;
use super::types::{AttestationConveyance, UserVerificationRequirement};

/// What to do when no metadata exists for an attested authenticator model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownAuthenticatorPolicy {
    /// Register with `TrustLevel::Unverified`
    #[default]
    Accept,
    /// Fail with `TrustUnavailable`
    Reject,
}

/// `WebAuthn` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying Party ID (usually the domain)
    pub rp_id: String,
    /// Relying Party name (displayed to user)
    pub rp_name: String,
    /// Relying Party origin (e.g., <https://example.com>)
    pub rp_origin: String,
    /// Further origins accepted in client data
    pub allowed_origins: Vec<String>,
    pub allow_cross_origin: bool,
    /// Timeout in seconds for ceremonies
    pub timeout_seconds: u64,
    /// Challenge length in bytes
    pub challenge_size: usize,
    pub user_verification: UserVerificationRequirement,
    pub attestation: AttestationConveyance,
    /// Optional authenticator attachment ("platform", "cross-platform")
    pub authenticator_attachment: Option<String>,
    /// Optional resident key preference ("discouraged", "preferred", "required")
    pub resident_key: Option<String>,
    /// COSE algorithm identifiers offered in `pubKeyCredParams`, in preference order
    pub algorithms: Vec<i64>,
    pub unknown_authenticator_policy: UnknownAuthenticatorPolicy,
    /// Reject self and none attestation
    pub require_trusted_attestation: bool,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "MFA Provider".to_string(),
            rp_origin: "https://localhost".to_string(),
            allowed_origins: Vec::new(),
            allow_cross_origin: false,
            timeout_seconds: 60,
            challenge_size: 32,
            user_verification: UserVerificationRequirement::Preferred,
            attestation: AttestationConveyance::None,
            authenticator_attachment: None,
            resident_key: None,
            algorithms: vec![
                CoseAlgorithm::Es256.id(),
                CoseAlgorithm::EdDsa.id(),
                CoseAlgorithm::Es384.id(),
                CoseAlgorithm::Ps256.id(),
                CoseAlgorithm::Rs256.id(),
            ],
            unknown_authenticator_policy: UnknownAuthenticatorPolicy::Accept,
            require_trusted_attestation: false,
        }
    }
}

impl WebAuthnSettings {
    /// Ceremony timeout in milliseconds, saturating at `u32::MAX`
    #[must_use]
    pub fn timeout_millis(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }
}

/// Everything the stateless verifiers need besides the issued options
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub rp_id: String,
    pub origins: OriginPolicy,
    pub unknown_authenticator_policy: UnknownAuthenticatorPolicy,
    pub require_trusted_attestation: bool,
}

impl VerifierConfig {
    /// Build the verifier configuration from settings
    ///
    /// # Errors
    /// Returns `VerifyError::Configuration` if an origin is not a valid URL.
    pub fn from_settings(settings: &WebAuthnSettings) -> Result<Self, VerifyError> {
        Ok(Self {
            rp_id: settings.rp_id.clone(),
            origins: OriginPolicy::new(
                &settings.rp_origin,
                &settings.allowed_origins,
                settings.allow_cross_origin,
            )?,
            unknown_authenticator_policy: settings.unknown_authenticator_policy,
            require_trusted_attestation: settings.require_trusted_attestation,
        })
    }
}
