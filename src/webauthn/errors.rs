//! Verification error types
//!
//! Every failure path of the registration and assertion verifiers ends in a
//! specific `VerifyError`. The engine never logs these itself; callers log
//! `kind()` and show users `public_message()`.

use thiserror::Error;

use crate::cbor::DecodeError;
use crate::crypto::CryptoError;

/// Errors returned by the ceremony verifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Malformed binary input
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("challenge does not match the issued challenge")]
    ChallengeMismatch,

    #[error("origin {0} is not allowed for this relying party")]
    OriginMismatch(String),

    #[error("unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("credential is already registered")]
    DuplicateCredential,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("signature counter did not increase (stored {stored}, received {received})")]
    ReplayDetected { stored: u32, received: u32 },

    #[error("user handle does not own this credential")]
    UserHandleMismatch,

    #[error("credential is not known for this user")]
    UnknownCredential,

    #[error("no trust metadata available: {0}")]
    TrustUnavailable(String),

    /// Response JSON or encoding is not what the protocol requires
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("malformed authenticator data: {0}")]
    MalformedAuthenticatorData(String),

    #[error("client data type {actual} does not match expected {expected}")]
    ClientDataTypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("relying party id hash does not match")]
    RelyingPartyMismatch,

    #[error("user presence flag not set")]
    UserPresenceRequired,

    #[error("user verification required but not performed")]
    UserVerificationRequired,

    #[error("authenticator data carries no attested credential")]
    MissingAttestedCredentialData,

    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("invalid attestation statement: {0}")]
    InvalidAttestation(String),

    #[error("attestation is not trusted: {0}")]
    UntrustedAttestation(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Fieldless mirror of [`VerifyError`] for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyErrorKind {
    Decode,
    ChallengeMismatch,
    OriginMismatch,
    UnsupportedAttestationFormat,
    DuplicateCredential,
    InvalidSignature,
    ReplayDetected,
    UserHandleMismatch,
    UnknownCredential,
    TrustUnavailable,
    MalformedResponse,
    MalformedAuthenticatorData,
    ClientDataTypeMismatch,
    RelyingPartyMismatch,
    UserPresenceRequired,
    UserVerificationRequired,
    MissingAttestedCredentialData,
    UnsupportedAlgorithm,
    InvalidAttestation,
    UntrustedAttestation,
    Configuration,
}

impl VerifyError {
    #[must_use]
    pub fn kind(&self) -> VerifyErrorKind {
        match self {
            VerifyError::Decode(_) => VerifyErrorKind::Decode,
            VerifyError::ChallengeMismatch => VerifyErrorKind::ChallengeMismatch,
            VerifyError::OriginMismatch(_) => VerifyErrorKind::OriginMismatch,
            VerifyError::UnsupportedAttestationFormat(_) => {
                VerifyErrorKind::UnsupportedAttestationFormat
            }
            VerifyError::DuplicateCredential => VerifyErrorKind::DuplicateCredential,
            VerifyError::InvalidSignature => VerifyErrorKind::InvalidSignature,
            VerifyError::ReplayDetected { .. } => VerifyErrorKind::ReplayDetected,
            VerifyError::UserHandleMismatch => VerifyErrorKind::UserHandleMismatch,
            VerifyError::UnknownCredential => VerifyErrorKind::UnknownCredential,
            VerifyError::TrustUnavailable(_) => VerifyErrorKind::TrustUnavailable,
            VerifyError::MalformedResponse(_) => VerifyErrorKind::MalformedResponse,
            VerifyError::MalformedAuthenticatorData(_) => {
                VerifyErrorKind::MalformedAuthenticatorData
            }
            VerifyError::ClientDataTypeMismatch { .. } => VerifyErrorKind::ClientDataTypeMismatch,
            VerifyError::RelyingPartyMismatch => VerifyErrorKind::RelyingPartyMismatch,
            VerifyError::UserPresenceRequired => VerifyErrorKind::UserPresenceRequired,
            VerifyError::UserVerificationRequired => VerifyErrorKind::UserVerificationRequired,
            VerifyError::MissingAttestedCredentialData => {
                VerifyErrorKind::MissingAttestedCredentialData
            }
            VerifyError::UnsupportedAlgorithm(_) => VerifyErrorKind::UnsupportedAlgorithm,
            VerifyError::InvalidAttestation(_) => VerifyErrorKind::InvalidAttestation,
            VerifyError::UntrustedAttestation(_) => VerifyErrorKind::UntrustedAttestation,
            VerifyError::Configuration(_) => VerifyErrorKind::Configuration,
        }
    }

    /// Text safe to show an end user
    ///
    /// Failures that could act as an oracle for an attacker share one message.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            VerifyErrorKind::ReplayDetected
            | VerifyErrorKind::InvalidSignature
            | VerifyErrorKind::UnknownCredential
            | VerifyErrorKind::UserHandleMismatch => "Authentication failed.",
            VerifyErrorKind::ChallengeMismatch => "The request has expired. Please try again.",
            VerifyErrorKind::DuplicateCredential => "This security key is already registered.",
            VerifyErrorKind::UserVerificationRequired | VerifyErrorKind::UserPresenceRequired => {
                "Please verify yourself on your security key and try again."
            }
            VerifyErrorKind::UnsupportedAttestationFormat
            | VerifyErrorKind::UnsupportedAlgorithm
            | VerifyErrorKind::UntrustedAttestation
            | VerifyErrorKind::TrustUnavailable => "This security key is not supported.",
            VerifyErrorKind::Configuration => "The service is not configured correctly.",
            _ => "The security key response was not valid.",
        }
    }
}

impl From<CryptoError> for VerifyError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Random => VerifyError::Configuration(err.to_string()),
            CryptoError::Chain(reason) => VerifyError::UntrustedAttestation(reason),
            other => VerifyError::InvalidAttestation(other.to_string()),
        }
    }
}
