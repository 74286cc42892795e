use thiserror::Error;

use crate::crypto::CryptoError;

/// Metadata loading failures
///
/// None of these reach the verifiers directly; a failed refresh leaves the
/// previous cache in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("metadata fetch failed: {0}")]
    Fetch(String),

    #[error("metadata fetch timed out after {0} seconds")]
    Timeout(u64),

    #[error("metadata file error: {0}")]
    Io(String),

    #[error("metadata is not valid JSON: {0}")]
    Json(String),

    #[error("metadata blob signature rejected: {0}")]
    Signature(#[from] CryptoError),

    #[error("invalid metadata entry: {0}")]
    InvalidEntry(String),

    #[error("a refresh is already in progress")]
    RefreshInProgress,
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        MetadataError::Json(err.to_string())
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(err: reqwest::Error) -> Self {
        MetadataError::Fetch(err.to_string())
    }
}
