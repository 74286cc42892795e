//! `fido-u2f` attestation for legacy U2F authenticators

use openssl::nid::Nid;

use super::{invalid, AttestationContext, AttestationOutcome};
use crate::crypto::x509::SignatureScheme;
use crate::webauthn::cose::{CoseKey, EcCurve};
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    let signature = context.signature()?;
    let certificates = context.required_certificates()?;
    if certificates.len() != 1 {
        return Err(invalid("fido-u2f requires exactly one attestation certificate"));
    }
    let leaf = &certificates[0];

    let leaf_key = leaf.public_key()?;
    let is_p256 = leaf_key
        .ec_key()
        .ok()
        .and_then(|key| key.group().curve_name())
        == Some(Nid::X9_62_PRIME256V1);
    if !is_p256 {
        return Err(invalid("fido-u2f certificate key must be P-256"));
    }

    let CoseKey::Ec2 {
        curve: EcCurve::P256,
        x,
        y,
        ..
    } = &context.credential.public_key
    else {
        return Err(invalid("fido-u2f credential key must be P-256"));
    };

    // 0x00 || rpIdHash || clientDataHash || credentialId || 0x04 || x || y
    let mut verification_data = Vec::with_capacity(1 + 32 + 32 + 65 + x.len());
    verification_data.push(0x00);
    verification_data.extend_from_slice(&context.auth_data.rp_id_hash);
    verification_data.extend_from_slice(context.client_data_hash);
    verification_data.extend_from_slice(&context.credential.credential_id);
    verification_data.push(0x04);
    verification_data.extend_from_slice(x);
    verification_data.extend_from_slice(y);

    if !leaf.verify_signature(SignatureScheme::EcdsaSha256, &verification_data, signature)? {
        return Err(VerifyError::InvalidSignature);
    }

    Ok(AttestationOutcome::new(AttestationType::Basic, certificates))
}
