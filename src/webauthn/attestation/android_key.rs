//! `android-key` attestation
//!
//! The leaf certificate carries the Android Keystore `KeyDescription`
//! extension describing the credential key.

use super::{invalid, verify_with_certificate, AttestationContext, AttestationOutcome};
use crate::crypto::der::{DerReader, TAG_INTEGER, TAG_SET};
use crate::crypto::{constant_time_eq, DerError};
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

const OID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

const TAG_PURPOSE: u32 = 1;
const TAG_ALL_APPLICATIONS: u32 = 600;
const TAG_ORIGIN: u32 = 702;

const KM_ORIGIN_GENERATED: i64 = 0;
const KM_PURPOSE_SIGN: i64 = 2;

/// Fields of one `AuthorizationList` relevant to `WebAuthn`
#[derive(Debug, Default)]
struct AuthorizationList {
    purposes: Vec<i64>,
    all_applications: bool,
    origin: Option<i64>,
}

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    let algorithm = context.algorithm()?;
    let signature = context.signature()?;
    let certificates = context.required_certificates()?;
    let leaf = &certificates[0];

    verify_with_certificate(leaf, algorithm, &context.signed_data(), signature)?;

    if !context.credential.public_key.matches(&leaf.public_key()?) {
        return Err(invalid("certificate key does not match the credential key"));
    }

    let extension = leaf
        .extension(OID_KEY_DESCRIPTION)?
        .ok_or_else(|| invalid("certificate has no key description extension"))?;
    let (challenge, software, tee) = parse_key_description(&extension.value)?;

    if !constant_time_eq(challenge, context.client_data_hash) {
        return Err(invalid("attestation challenge does not match client data hash"));
    }
    if software.all_applications || tee.all_applications {
        return Err(invalid("key is usable by all applications"));
    }
    let origin = tee.origin.or(software.origin);
    if origin != Some(KM_ORIGIN_GENERATED) {
        return Err(invalid("key was not generated in the keystore"));
    }
    if !tee
        .purposes
        .iter()
        .chain(&software.purposes)
        .any(|p| *p == KM_PURPOSE_SIGN)
    {
        return Err(invalid("key purpose does not include signing"));
    }

    Ok(AttestationOutcome::new(AttestationType::Basic, certificates))
}

/// Returns the attestation challenge and both authorization lists
fn parse_key_description(
    der: &[u8],
) -> Result<(&[u8], AuthorizationList, AuthorizationList), DerError> {
    let mut description = DerReader::new(der).read_sequence()?;
    description.read_integer()?; // attestationVersion
    description.skip()?; // attestationSecurityLevel
    description.read_integer()?; // keymasterVersion
    description.skip()?; // keymasterSecurityLevel
    let challenge = description.read_octet_string()?;
    description.read_octet_string()?; // uniqueId
    let software = parse_authorization_list(description.read_sequence()?)?;
    let tee = parse_authorization_list(description.read_sequence()?)?;
    Ok((challenge, software, tee))
}

fn parse_authorization_list(mut list: DerReader<'_>) -> Result<AuthorizationList, DerError> {
    let mut out = AuthorizationList::default();
    while !list.is_empty() {
        let field = list.read()?;
        if field.is_context(TAG_PURPOSE) {
            let mut set = field.reader().expect(TAG_SET)?.reader();
            while !set.is_empty() {
                out.purposes.push(set.expect(TAG_INTEGER)?.as_i64()?);
            }
        } else if field.is_context(TAG_ALL_APPLICATIONS) {
            out.all_applications = true;
        } else if field.is_context(TAG_ORIGIN) {
            out.origin = Some(field.reader().read_integer()?);
        }
    }
    Ok(out)
}
