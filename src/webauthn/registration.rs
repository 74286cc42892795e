//! Registration (attestation) verification
//!
//! Stateless: the caller supplies the options it issued, the trust source and
//! a uniqueness check, and persists the returned credential itself.

use std::future::Future;

use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;

use super::attestation::{self, AttestationContext, AttestationFormat, AttestationOutcome};
use super::authenticator_data::AuthenticatorData;
use super::client_data::{verify_client_data, TYPE_CREATE};
use super::errors::VerifyError;
use super::settings::{UnknownAuthenticatorPolicy, VerifierConfig};
use super::types::{
    AttestationType, CredentialDescriptor, RegistrationOptions, RegistrationResponse, TrustLevel,
    UserCredential, UserVerificationRequirement, VerifiedCredential,
};
use crate::cbor::{self, Value};
use crate::crypto::{sha256, verify_chain};
use crate::metadata::TrustSource;

/// The three members of a decoded attestation object
struct AttestationObject {
    format: String,
    statement: cbor::Map,
    auth_data: Vec<u8>,
}

fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, VerifyError> {
    let Value::Map(map) = cbor::decode(bytes)? else {
        return Err(VerifyError::MalformedResponse(
            "attestation object is not a map".to_string(),
        ));
    };

    let format = map
        .get_text("fmt")
        .and_then(Value::as_text)
        .ok_or_else(|| VerifyError::MalformedResponse("attestation object has no fmt".to_string()))?
        .to_string();
    let statement = map
        .get_text("attStmt")
        .and_then(Value::as_map)
        .ok_or_else(|| {
            VerifyError::MalformedResponse("attestation object has no attStmt".to_string())
        })?
        .clone();
    let auth_data = map
        .get_text("authData")
        .and_then(Value::as_bytes)
        .ok_or_else(|| {
            VerifyError::MalformedResponse("attestation object has no authData".to_string())
        })?
        .to_vec();

    Ok(AttestationObject {
        format,
        statement,
        auth_data,
    })
}

/// Verify a registration response against the options issued for it
///
/// `is_unique` receives the new credential id and must resolve to `false`
/// when another user already owns it.
///
/// # Errors
/// Each failed check yields its own `VerifyError`; nothing is persisted.
pub async fn verify_registration<F, Fut>(
    response: &RegistrationResponse,
    options: &RegistrationOptions,
    config: &VerifierConfig,
    trust: &dyn TrustSource,
    is_unique: F,
) -> Result<VerifiedCredential, VerifyError>
where
    F: FnOnce(Vec<u8>) -> Fut,
    Fut: Future<Output = bool>,
{
    verify_client_data(
        &response.response.client_data_json,
        TYPE_CREATE,
        &options.challenge,
        &config.origins,
    )?;
    debug!("🔐 Registration client data verified");

    let object = parse_attestation_object(&response.response.attestation_object)?;

    let auth_data = AuthenticatorData::parse(&object.auth_data)?;
    auth_data.verify_rp_id(&config.rp_id)?;
    if !auth_data.flags.user_present() {
        return Err(VerifyError::UserPresenceRequired);
    }
    if options.authenticator_selection.user_verification == UserVerificationRequirement::Required
        && !auth_data.flags.user_verified()
    {
        return Err(VerifyError::UserVerificationRequired);
    }
    let credential = auth_data
        .attested_credential
        .as_ref()
        .ok_or(VerifyError::MissingAttestedCredentialData)?;

    if credential.credential_id != response.raw_id {
        return Err(VerifyError::MalformedResponse(
            "rawId does not match the attested credential id".to_string(),
        ));
    }
    let algorithm = credential.public_key.algorithm();
    if !options
        .public_key_params
        .iter()
        .any(|p| p.alg == algorithm.id())
    {
        return Err(VerifyError::UnsupportedAlgorithm(algorithm.id()));
    }

    if !is_unique(credential.credential_id.clone()).await {
        return Err(VerifyError::DuplicateCredential);
    }

    let format = AttestationFormat::parse(&object.format)?;
    let client_data_hash = sha256(&response.response.client_data_json);
    let now = Utc::now();
    let outcome = attestation::verify_statement(
        format,
        &AttestationContext {
            auth_data: &auth_data,
            credential,
            client_data_hash: &client_data_hash,
            statement: &object.statement,
            now,
        },
    )?;
    debug!(
        "📜 {} attestation verified as {:?}",
        format.as_str(),
        outcome.attestation_type
    );

    let (trust_level, authenticator_description) =
        evaluate_trust(&outcome, credential.aaguid, config, trust).await?;

    Ok(VerifiedCredential {
        credential: build_credential(
            response,
            options,
            &auth_data,
            format,
            now,
        )?,
        attestation_type: outcome.attestation_type,
        trust_level,
        authenticator_description,
    })
}

fn build_credential(
    response: &RegistrationResponse,
    options: &RegistrationOptions,
    auth_data: &AuthenticatorData,
    format: AttestationFormat,
    now: DateTime<Utc>,
) -> Result<UserCredential, VerifyError> {
    let credential = auth_data
        .attested_credential
        .as_ref()
        .ok_or(VerifyError::MissingAttestedCredentialData)?;

    let mut descriptor = CredentialDescriptor::new(credential.credential_id.clone());
    descriptor
        .transports
        .clone_from(&response.response.transports);

    Ok(UserCredential {
        descriptor,
        public_key: credential.public_key_bytes.clone(),
        user_handle: options.user.id.clone(),
        signature_counter: auth_data.sign_count,
        credential_type: format.as_str().to_string(),
        aaguid: credential.aaguid,
        registration_date: now,
        backup_eligible: auth_data.flags.backup_eligible(),
        backed_up: auth_data.flags.backed_up(),
    })
}

/// Anchor a certificate trust path in metadata, or apply the fallback policy
async fn evaluate_trust(
    outcome: &AttestationOutcome,
    aaguid: Uuid,
    config: &VerifierConfig,
    trust: &dyn TrustSource,
) -> Result<(TrustLevel, Option<String>), VerifyError> {
    match outcome.attestation_type {
        AttestationType::None | AttestationType::Self_ => {
            if config.require_trusted_attestation {
                return Err(VerifyError::UntrustedAttestation(format!(
                    "{:?} attestation is not accepted",
                    outcome.attestation_type
                )));
            }
            let level = if outcome.attestation_type == AttestationType::None {
                TrustLevel::None
            } else {
                TrustLevel::SelfAttested
            };
            Ok((level, None))
        }
        AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa => {
            let Some(entry) = trust.get_metadata(aaguid).await else {
                return match config.unknown_authenticator_policy {
                    UnknownAuthenticatorPolicy::Reject => Err(VerifyError::TrustUnavailable(
                        format!("no metadata for authenticator {aaguid}"),
                    )),
                    UnknownAuthenticatorPolicy::Accept => {
                        debug!("No metadata for {aaguid}, accepting as unverified");
                        Ok((TrustLevel::Unverified, None))
                    }
                };
            };

            if entry.is_compromised() {
                return Err(VerifyError::UntrustedAttestation(format!(
                    "authenticator {} is revoked or compromised",
                    entry.description
                )));
            }

            let (leaf, intermediates) = outcome
                .trust_path
                .split_first()
                .ok_or_else(|| VerifyError::InvalidAttestation("empty trust path".to_string()))?;
            verify_chain(leaf, intermediates, &entry.root_certificates)?;
            debug!("🔗 Attestation chains to metadata for {}", entry.description);

            Ok((TrustLevel::Verified, Some(entry.description.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attestation_object_requires_members() {
        let missing_fmt = cbor::encode(&Value::Map(
            cbor::Map::new()
                .entry("attStmt", Value::Map(cbor::Map::new()))
                .entry("authData", vec![0u8; 37]),
        ));
        assert!(matches!(
            parse_attestation_object(&missing_fmt),
            Err(VerifyError::MalformedResponse(_))
        ));

        let not_a_map = cbor::encode(&Value::Array(Vec::new()));
        assert!(parse_attestation_object(&not_a_map).is_err());

        assert!(matches!(
            parse_attestation_object(&[0xa1]),
            Err(VerifyError::Decode(_))
        ));
    }
}
