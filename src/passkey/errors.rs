//! Passkey factor errors

use thiserror::Error;

use crate::store::StoreError;
use crate::webauthn::VerifyError;

/// Failures surfaced by [`super::PasskeyFactor`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasskeyError {
    /// The response failed verification
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// The session id is unknown, expired or already used
    #[error("ceremony session not found or expired")]
    SessionNotFound,

    /// The session belongs to the other ceremony
    #[error("session was issued for {expected}, not {actual}")]
    WrongCeremony {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PasskeyError {
    /// Text safe to show the user
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            PasskeyError::Verify(err) => err.public_message(),
            PasskeyError::SessionNotFound | PasskeyError::WrongCeremony { .. } => {
                "The request has expired. Please try again."
            }
            PasskeyError::UnknownUser(_) => "Authentication failed.",
            PasskeyError::Store(_) => "The service is temporarily unavailable.",
        }
    }
}
