//! `WebAuthn` credential verification
//!
//! Registration and assertion verifiers, the structures they parse and the
//! service that issues ceremony options. Verification is stateless: issued
//! options and stored credentials are supplied by the caller, and results
//! are returned for the caller to persist.

pub mod assertion;
pub mod attestation;
pub mod authenticator_data;
pub mod client_data;
pub mod cose;
mod errors;
pub mod registration;
mod service;
mod settings;
pub mod types;

#[cfg(test)]
mod tests;

pub use assertion::{check_counter, verify_assertion};
pub use attestation::AttestationFormat;
pub use authenticator_data::{AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use client_data::{CollectedClientData, OriginPolicy};
pub use cose::{CoseAlgorithm, CoseKey, EcCurve};
pub use errors::{VerifyError, VerifyErrorKind};
pub use registration::verify_registration;
pub use service::{WebAuthnService, MIN_CHALLENGE_SIZE};
pub use settings::{UnknownAuthenticatorPolicy, VerifierConfig, WebAuthnSettings};
pub use types::*;
