//! `android-safetynet` attestation
//!
//! The statement wraps a SafetyNet attestation JWS whose nonce commits to the
//! authenticator data and client data hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Duration;
use openssl::nid::Nid;
use serde::Deserialize;

use super::{invalid, AttestationContext, AttestationOutcome};
use crate::crypto::jws::parse_compact_jws;
use crate::crypto::sha256;
use crate::webauthn::errors::VerifyError;
use crate::webauthn::types::AttestationType;

const ATTEST_HOSTNAME: &str = "attest.android.com";
const TIMESTAMP_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    #[serde(default)]
    cts_profile_match: bool,
}

pub(super) fn verify(context: &AttestationContext<'_>) -> Result<AttestationOutcome, VerifyError> {
    context
        .statement
        .get_text("ver")
        .and_then(|v| v.as_text())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| invalid("statement has no ver"))?;
    let response = context.bytes("response")?;
    let token =
        std::str::from_utf8(response).map_err(|_| invalid("response is not a UTF-8 JWS"))?;

    let jws = parse_compact_jws(token)?;
    jws.verify_signature().map_err(|_| VerifyError::InvalidSignature)?;

    let leaf = jws
        .certificates
        .first()
        .ok_or_else(|| invalid("JWS has no x5c certificates"))?;
    let hostname_matches = leaf.subject_entry(Nid::COMMONNAME).as_deref() == Some(ATTEST_HOSTNAME)
        || leaf.dns_names().iter().any(|n| n == ATTEST_HOSTNAME);
    if !hostname_matches {
        return Err(invalid("JWS was not issued to attest.android.com"));
    }

    let payload: SafetyNetPayload = serde_json::from_slice(&jws.payload)
        .map_err(|e| invalid(&format!("SafetyNet payload: {e}")))?;

    let expected_nonce = STANDARD.encode(sha256(&context.signed_data()));
    if payload.nonce != expected_nonce {
        return Err(invalid("SafetyNet nonce does not match"));
    }
    if !payload.cts_profile_match {
        return Err(invalid("device failed the CTS profile check"));
    }

    let issued = chrono::DateTime::from_timestamp_millis(payload.timestamp_ms)
        .ok_or_else(|| invalid("SafetyNet timestamp out of range"))?;
    let window = Duration::seconds(TIMESTAMP_WINDOW_SECONDS);
    if issued > context.now + window || issued < context.now - window {
        return Err(invalid("SafetyNet response is outside the accepted time window"));
    }

    Ok(AttestationOutcome::new(
        AttestationType::Basic,
        jws.certificates,
    ))
}
