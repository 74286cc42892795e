use thiserror::Error;

/// Errors raised by credential stores and user directories
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("credential not found")]
    NotFound,

    #[error("credential id is already registered")]
    DuplicateCredential,

    /// Signature counters only move forward
    #[error("counter would go backwards (stored {stored}, attempted {attempted})")]
    CounterRegression { stored: u32, attempted: u32 },

    #[error("store backend error: {0}")]
    Backend(String),
}
