// Centralized logging for ceremony and OTP outcomes
use log::{debug, info, warn};

use crate::settings::ProviderSettings;
use crate::store::StoreError;
use crate::webauthn::{base64url, VerifiedAssertion, VerifiedCredential, VerifyError};

pub struct LoggingHelper;

impl LoggingHelper {
    /// Short, log-safe form of a credential id
    #[must_use]
    pub fn credential_label(credential_id: &[u8]) -> String {
        let encoded = base64url::encode(credential_id);
        match encoded.get(..12) {
            Some(prefix) if encoded.len() > 12 => format!("{prefix}…"),
            _ => encoded,
        }
    }

    /// Log a completed registration
    pub fn log_registration_success(upn: &str, verified: &VerifiedCredential) {
        info!(
            "✅ Passkey registered for {} (credential {}, format {}, trust {:?}{})",
            upn,
            Self::credential_label(verified.credential.id()),
            verified.credential.credential_type,
            verified.trust_level,
            verified
                .authenticator_description
                .as_deref()
                .map(|d| format!(", {d}"))
                .unwrap_or_default()
        );
    }

    /// Log a failed registration with the precise error kind
    pub fn log_registration_failure(upn: &str, error: &VerifyError) {
        warn!(
            "❌ Passkey registration failed for {}: {:?} ({})",
            upn,
            error.kind(),
            error
        );
    }

    /// Log a completed assertion
    pub fn log_authentication_success(upn: &str, assertion: &VerifiedAssertion) {
        info!(
            "🔓 Passkey authentication for {} (credential {}, counter {}, uv={})",
            upn,
            Self::credential_label(&assertion.credential_id),
            assertion.new_counter,
            assertion.user_verified
        );
    }

    /// Log a failed assertion with the precise error kind
    pub fn log_authentication_failure(upn: &str, error: &VerifyError) {
        warn!(
            "❌ Passkey authentication failed for {}: {:?} ({})",
            upn,
            error.kind(),
            error
        );
    }

    /// Log a storage failure that aborted a ceremony
    pub fn log_store_failure(upn: &str, ceremony: &str, error: &StoreError) {
        warn!("💥 Credential store failed during {ceremony} for {upn}: {error}");
    }

    /// Log an expired or unknown ceremony session
    pub fn log_session_missing(session_id: &str) {
        debug!("⌛ Ceremony session {session_id} is unknown or expired");
    }

    /// Log the effective configuration at startup
    pub fn log_settings_summary(settings: &ProviderSettings) {
        info!(
            "🔧 Relying party {} ({}) at {}",
            settings.webauthn.rp_id, settings.webauthn.rp_name, settings.webauthn.rp_origin
        );
        info!(
            "🔧 User verification {:?}, attestation {:?}, unknown authenticators: {:?}",
            settings.webauthn.user_verification,
            settings.webauthn.attestation,
            settings.webauthn.unknown_authenticator_policy
        );
        if settings.metadata.enabled {
            info!(
                "🔧 Metadata service enabled ({}), refresh every {}s",
                settings.metadata.mds_url, settings.metadata.refresh_interval_seconds
            );
        } else {
            info!("⏭️  Metadata service disabled");
        }
    }
}
