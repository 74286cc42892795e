//! `apple` anonymous attestation

use super::{invalid, AttestationContext, AttestationOutcome};
use crate::crypto::der::{DerReader, TAG_OCTET_STRING};
use crate::crypto::{constant_time_eq, sha256, DerError};
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    let certificates = context.required_certificates()?;
    let leaf = &certificates[0];

    let extension = leaf
        .extension(OID_APPLE_NONCE)?
        .ok_or_else(|| invalid("certificate has no nonce extension"))?;
    let nonce = parse_nonce(&extension.value)?;
    let expected = sha256(&context.signed_data());
    if !constant_time_eq(nonce, &expected) {
        return Err(invalid("certificate nonce does not match"));
    }

    if !context.credential.public_key.matches(&leaf.public_key()?) {
        return Err(invalid("certificate key does not match the credential key"));
    }

    Ok(AttestationOutcome::new(AttestationType::AnonCa, certificates))
}

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }`
fn parse_nonce(der: &[u8]) -> Result<&[u8], DerError> {
    let mut sequence = DerReader::new(der).read_sequence()?;
    let wrapper = sequence
        .read_optional_context(1)?
        .ok_or(DerError::Malformed("nonce wrapper missing"))?;
    let nonce = wrapper.reader().expect(TAG_OCTET_STRING)?;
    Ok(nonce.content)
}
