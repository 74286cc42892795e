//! `WebAuthn` service implementation
//!
//! Issues ceremony options and forwards responses to the stateless
//! verifiers. The service holds no per-ceremony state: options returned by
//! the `start_*` methods must be kept by the caller and passed back.

use std::future::Future;

use log::debug;

use super::assertion;
use super::errors::VerifyError;
use super::registration;
use super::settings::{VerifierConfig, WebAuthnSettings};
use super::types::{
    AuthenticationOptions, AuthenticationResponse, AuthenticatorSelectionCriteria, CredentialType,
    PublicKeyCredentialParameters, RegistrationOptions, RegistrationResponse, RelyingParty, User,
    UserCredential, VerifiedAssertion, VerifiedCredential,
};
use crate::crypto;
use crate::metadata::TrustSource;

/// Minimum challenge length accepted from settings
pub const MIN_CHALLENGE_SIZE: usize = 16;

/// Core `WebAuthn` service
#[derive(Debug, Clone)]
pub struct WebAuthnService {
    settings: WebAuthnSettings,
    config: VerifierConfig,
}

impl WebAuthnService {
    /// Create a new `WebAuthnService` with the given settings
    ///
    /// # Errors
    /// Returns `VerifyError::Configuration` for an invalid origin or a
    /// challenge size below [`MIN_CHALLENGE_SIZE`].
    pub fn new(settings: WebAuthnSettings) -> Result<Self, VerifyError> {
        if settings.challenge_size < MIN_CHALLENGE_SIZE {
            return Err(VerifyError::Configuration(format!(
                "challenge_size must be at least {MIN_CHALLENGE_SIZE} bytes"
            )));
        }
        let config = VerifierConfig::from_settings(&settings)?;
        Ok(Self { settings, config })
    }

    #[must_use]
    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Create registration options for a new credential
    ///
    /// # Arguments
    /// * `user` - The registering user
    /// * `existing` - Credentials the user already has, sent as `excludeCredentials`
    ///
    /// # Errors
    /// Fails only if the system random source fails.
    pub fn start_registration(
        &self,
        user: &User,
        existing: &[UserCredential],
    ) -> Result<RegistrationOptions, VerifyError> {
        let challenge = crypto::generate_challenge(self.settings.challenge_size)?;
        debug!("🆕 Registration options issued for {}", user.name);

        Ok(RegistrationOptions {
            challenge,
            rp: RelyingParty {
                id: self.settings.rp_id.clone(),
                name: self.settings.rp_name.clone(),
            },
            user: user.clone(),
            public_key_params: self
                .settings
                .algorithms
                .iter()
                .map(|alg| PublicKeyCredentialParameters {
                    credential_type: CredentialType::PublicKey,
                    alg: *alg,
                })
                .collect(),
            timeout: self.settings.timeout_millis(),
            exclude_credentials: existing.iter().map(|c| c.descriptor.clone()).collect(),
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment.clone(),
                require_resident_key: self.settings.resident_key.as_deref() == Some("required"),
                resident_key: self.settings.resident_key.clone(),
                user_verification: self.settings.user_verification,
            },
            attestation: self.settings.attestation,
            extensions: None,
        })
    }

    /// Create authentication options for the given credentials
    ///
    /// An empty list leaves `allowCredentials` empty (discoverable credentials).
    ///
    /// # Errors
    /// Fails only if the system random source fails.
    pub fn start_authentication(
        &self,
        credentials: &[UserCredential],
    ) -> Result<AuthenticationOptions, VerifyError> {
        let challenge = crypto::generate_challenge(self.settings.challenge_size)?;

        Ok(AuthenticationOptions {
            challenge,
            timeout: self.settings.timeout_millis(),
            rp_id: self.settings.rp_id.clone(),
            allow_credentials: credentials.iter().map(|c| c.descriptor.clone()).collect(),
            user_verification: self.settings.user_verification,
            extensions: None,
        })
    }

    /// Complete registration with the client response
    ///
    /// # Errors
    /// See [`registration::verify_registration`].
    pub async fn finish_registration<F, Fut>(
        &self,
        response: &RegistrationResponse,
        options: &RegistrationOptions,
        trust: &dyn TrustSource,
        is_unique: F,
    ) -> Result<VerifiedCredential, VerifyError>
    where
        F: FnOnce(Vec<u8>) -> Fut,
        Fut: Future<Output = bool>,
    {
        registration::verify_registration(response, options, &self.config, trust, is_unique).await
    }

    /// Complete authentication with the client response
    ///
    /// # Errors
    /// See [`assertion::verify_assertion`].
    pub fn finish_authentication<F>(
        &self,
        response: &AuthenticationResponse,
        options: &AuthenticationOptions,
        stored: &UserCredential,
        owns_handle: F,
    ) -> Result<VerifiedAssertion, VerifyError>
    where
        F: FnOnce(&[u8], &[u8]) -> bool,
    {
        assertion::verify_assertion(response, options, &self.config, stored, owns_handle)
    }
}
