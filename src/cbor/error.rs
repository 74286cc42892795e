//! Codec error types

use thiserror::Error;

/// Reason a byte sequence could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("{0} trailing bytes after the data item")]
    TrailingBytes(usize),

    #[error("reserved additional information value {0}")]
    ReservedAdditionalInfo(u8),

    #[error("indefinite length is not allowed for major type {0}")]
    IndefiniteNotAllowed(u8),

    #[error("break code outside of an indefinite-length item")]
    UnexpectedBreak,

    #[error("indefinite-length string chunk has the wrong type")]
    InvalidChunk,

    #[error("two-byte simple value {0} is not well-formed")]
    InvalidSimpleValue(u8),

    #[error("text string is not valid UTF-8")]
    InvalidUtf8,

    #[error("declared length {0} exceeds the remaining input")]
    LengthTooLarge(u64),

    #[error("nesting depth exceeds the limit of {0}")]
    DepthExceeded(usize),
}

/// Decoding failure with the byte offset where it was detected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("CBOR decode error at byte {offset}: {kind}")]
pub struct DecodeError {
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    #[must_use]
    pub fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }
}
