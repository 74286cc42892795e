//! Binary object codec (CBOR, RFC 8949)
//!
//! Carries the attestation object and COSE keys produced by authenticators.
//! The codec has no knowledge of authentication semantics.
//!
//! Integers use the full major type 0/1 range [-2^64, 2^64-1]. Bignums
//! (tags 2 and 3) are kept intact as `Tag(2|3, Bytes)`; numeric accessors
//! return `None` for them so callers must reject them explicitly.

pub mod datetime;
pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use decode::{
    decode, decode_prefix, decode_prefix_with, decode_with, DecodeOptions, DEFAULT_MAX_DEPTH,
};
pub use encode::{encode, encode_into};
pub use error::{DecodeError, DecodeErrorKind};
pub use value::{
    Map, Value, TAG_DATETIME_EPOCH, TAG_DATETIME_TEXT, TAG_NEGATIVE_BIGNUM, TAG_POSITIVE_BIGNUM,
};
