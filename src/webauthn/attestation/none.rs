//! `none` attestation: no provenance is conveyed

use super::{invalid, AttestationContext, AttestationOutcome};
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    if !context.statement.is_empty() {
        return Err(invalid("none attestation must have an empty statement"));
    }
    Ok(AttestationOutcome::new(AttestationType::None, Vec::new()))
}
