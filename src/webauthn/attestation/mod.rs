//! Attestation statement verification
//!
//! The set of formats is closed: the format tag from the attestation object is
//! mapped onto [`AttestationFormat`] and any other tag is rejected. Each format
//! checks its statement signature and returns the attestation type plus the
//! certificate trust path; trust anchoring against metadata happens in the
//! registration verifier.

mod android_key;
mod android_safetynet;
mod apple;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

use chrono::{DateTime, Utc};

use super::authenticator_data::{AttestedCredentialData, AuthenticatorData};
use super::cose::CoseAlgorithm;
use super::errors::VerifyError;
use super::types::AttestationType;
use crate::cbor::{Map, Value};
use crate::crypto::Certificate;

/// FIDO AAGUID certificate extension
pub(crate) const OID_FIDO_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";

/// Attestation statement formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    Packed,
    FidoU2f,
    AndroidKey,
    AndroidSafetyNet,
    Tpm,
    Apple,
}

impl AttestationFormat {
    /// Map a format tag onto the supported set
    ///
    /// # Errors
    /// Returns `UnsupportedAttestationFormat` for unknown tags.
    pub fn parse(tag: &str) -> Result<Self, VerifyError> {
        match tag {
            "none" => Ok(AttestationFormat::None),
            "packed" => Ok(AttestationFormat::Packed),
            "fido-u2f" => Ok(AttestationFormat::FidoU2f),
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "android-safetynet" => Ok(AttestationFormat::AndroidSafetyNet),
            "tpm" => Ok(AttestationFormat::Tpm),
            "apple" => Ok(AttestationFormat::Apple),
            other => Err(VerifyError::UnsupportedAttestationFormat(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttestationFormat::None => "none",
            AttestationFormat::Packed => "packed",
            AttestationFormat::FidoU2f => "fido-u2f",
            AttestationFormat::AndroidKey => "android-key",
            AttestationFormat::AndroidSafetyNet => "android-safetynet",
            AttestationFormat::Tpm => "tpm",
            AttestationFormat::Apple => "apple",
        }
    }
}

/// Inputs shared by every format verifier
pub struct AttestationContext<'a> {
    pub auth_data: &'a AuthenticatorData,
    pub credential: &'a AttestedCredentialData,
    pub client_data_hash: &'a [u8; 32],
    pub statement: &'a Map,
    pub now: DateTime<Utc>,
}

impl AttestationContext<'_> {
    /// `authData || clientDataHash`, the payload most formats sign
    fn signed_data(&self) -> Vec<u8> {
        let mut data = self.auth_data.raw().to_vec();
        data.extend_from_slice(self.client_data_hash);
        data
    }

    fn algorithm(&self) -> Result<CoseAlgorithm, VerifyError> {
        let alg = self
            .statement
            .get_text("alg")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("statement has no alg"))?;
        CoseAlgorithm::from_id(alg)
    }

    fn signature(&self) -> Result<&[u8], VerifyError> {
        self.bytes("sig")
    }

    fn bytes(&self, field: &str) -> Result<&[u8], VerifyError> {
        self.statement
            .get_text(field)
            .and_then(Value::as_bytes)
            .ok_or_else(|| invalid(&format!("statement has no {field}")))
    }

    /// Certificates from `x5c`, leaf first; `None` when the field is absent
    fn certificates(&self) -> Result<Option<Vec<Certificate>>, VerifyError> {
        let Some(x5c) = self.statement.get_text("x5c") else {
            return Ok(None);
        };
        let items = x5c
            .as_array()
            .filter(|items| !items.is_empty())
            .ok_or_else(|| invalid("x5c must be a non-empty array"))?;
        items
            .iter()
            .map(|item| {
                let der = item
                    .as_bytes()
                    .ok_or_else(|| invalid("x5c entry is not a byte string"))?;
                Certificate::from_der(der).map_err(VerifyError::from)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn required_certificates(&self) -> Result<Vec<Certificate>, VerifyError> {
        self.certificates()?
            .ok_or_else(|| invalid("statement has no x5c"))
    }
}

/// Result of a format-specific check
#[derive(Debug, Clone)]
pub struct AttestationOutcome {
    pub attestation_type: AttestationType,
    pub trust_path: Vec<Certificate>, // Leaf first; empty for self and none
}

impl AttestationOutcome {
    fn new(attestation_type: AttestationType, trust_path: Vec<Certificate>) -> Self {
        Self {
            attestation_type,
            trust_path,
        }
    }
}

/// Verify an attestation statement in the given format
///
/// # Errors
/// Format-specific `InvalidAttestation`, `InvalidSignature` and
/// `UnsupportedAlgorithm` failures.
pub fn verify_statement(
    format: AttestationFormat,
    context: &AttestationContext<'_>,
) -> Result<AttestationOutcome, VerifyError> {
    match format {
        AttestationFormat::None => none::verify(context),
        AttestationFormat::Packed => packed::verify(context),
        AttestationFormat::FidoU2f => fido_u2f::verify(context),
        AttestationFormat::AndroidKey => android_key::verify(context),
        AttestationFormat::AndroidSafetyNet => android_safetynet::verify(context),
        AttestationFormat::Tpm => tpm::verify(context),
        AttestationFormat::Apple => apple::verify(context),
    }
}

fn invalid(reason: &str) -> VerifyError {
    VerifyError::InvalidAttestation(reason.to_string())
}

/// Verify a certificate-key signature, mapping a mismatch to `InvalidSignature`
fn verify_with_certificate(
    certificate: &Certificate,
    algorithm: CoseAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<(), VerifyError> {
    if certificate.verify_signature(algorithm.signature_scheme(), data, signature)? {
        Ok(())
    } else {
        Err(VerifyError::InvalidSignature)
    }
}

/// If the leaf carries the FIDO AAGUID extension it must match the credential
fn check_aaguid_extension(
    certificate: &Certificate,
    credential: &AttestedCredentialData,
) -> Result<(), VerifyError> {
    let Some(extension) = certificate.extension(OID_FIDO_AAGUID)? else {
        return Ok(());
    };
    if extension.critical {
        return Err(invalid("AAGUID extension must not be critical"));
    }
    let mut reader = crate::crypto::DerReader::new(&extension.value);
    let aaguid = reader.read_octet_string()?;
    if aaguid != credential.aaguid.as_bytes() {
        return Err(invalid("certificate AAGUID does not match authenticator data"));
    }
    Ok(())
}

impl From<crate::crypto::DerError> for VerifyError {
    fn from(err: crate::crypto::DerError) -> Self {
        VerifyError::InvalidAttestation(err.to_string())
    }
}
