//! Authentication (assertion) verification

use chrono::Utc;
use log::debug;

use super::authenticator_data::AuthenticatorData;
use super::client_data::{verify_client_data, TYPE_GET};
use super::cose::CoseKey;
use super::errors::VerifyError;
use super::settings::VerifierConfig;
use super::types::{
    AuthenticationOptions, AuthenticationResponse, UserCredential, UserVerificationRequirement,
    VerifiedAssertion,
};
use crate::crypto::{constant_time_eq, sha256};

/// Signature counter rule
///
/// The counter must strictly increase. Authenticators without a counter
/// always report zero, so zero against a stored zero is accepted.
///
/// # Errors
/// Returns `ReplayDetected` for any other non-increase.
pub fn check_counter(stored: u32, received: u32) -> Result<(), VerifyError> {
    if received > stored || (received == 0 && stored == 0) {
        Ok(())
    } else {
        Err(VerifyError::ReplayDetected { stored, received })
    }
}

/// Verify an assertion against the stored credential it claims to use
///
/// `owns_handle(user_handle, credential_id)` is consulted when the response
/// carries a user handle.
///
/// # Errors
/// Each failed check yields its own `VerifyError`. The stored credential is
/// never modified; the caller persists `new_counter`.
pub fn verify_assertion<F>(
    response: &AuthenticationResponse,
    options: &AuthenticationOptions,
    config: &VerifierConfig,
    stored: &UserCredential,
    owns_handle: F,
) -> Result<VerifiedAssertion, VerifyError>
where
    F: FnOnce(&[u8], &[u8]) -> bool,
{
    let client_data_json = &response.response.client_data_json;
    verify_client_data(client_data_json, TYPE_GET, &options.challenge, &config.origins)?;

    if !options.allow_credentials.is_empty()
        && !options
            .allow_credentials
            .iter()
            .any(|c| c.id == response.raw_id)
    {
        return Err(VerifyError::UnknownCredential);
    }
    if response.raw_id != stored.id() {
        return Err(VerifyError::UnknownCredential);
    }

    let auth_data = AuthenticatorData::parse(&response.response.authenticator_data)?;
    auth_data.verify_rp_id(&config.rp_id)?;
    if !auth_data.flags.user_present() {
        return Err(VerifyError::UserPresenceRequired);
    }
    if options.user_verification == UserVerificationRequirement::Required
        && !auth_data.flags.user_verified()
    {
        return Err(VerifyError::UserVerificationRequired);
    }

    check_counter(stored.signature_counter, auth_data.sign_count)?;

    let mut signed = auth_data.raw().to_vec();
    signed.extend_from_slice(&sha256(client_data_json));
    let public_key = CoseKey::from_bytes(&stored.public_key)?;
    public_key.verify(&signed, &response.response.signature)?;
    debug!("✍️ Assertion signature verified ({:?})", public_key.algorithm());

    if let Some(user_handle) = &response.response.user_handle {
        if !constant_time_eq(user_handle, &stored.user_handle)
            || !owns_handle(user_handle, stored.id())
        {
            return Err(VerifyError::UserHandleMismatch);
        }
    }

    Ok(VerifiedAssertion {
        credential_id: stored.id().to_vec(),
        user_handle: stored.user_handle.clone(),
        new_counter: auth_data.sign_count,
        user_verified: auth_data.flags.user_verified(),
        backup_eligible: auth_data.flags.backup_eligible(),
        backed_up: auth_data.flags.backed_up(),
        authenticated_at: Utc::now(),
    })
}
