//! Cryptographic building blocks
//!
//! Random challenges and digests (`ring`), a small DER reader for the
//! certificate extensions attestation formats depend on, X.509 chain checks
//! (`openssl`) and compact JWS verification for signed metadata and
//! SafetyNet statements.

pub mod der;
pub mod jws;
pub mod x509;

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

pub use der::{DerError, DerReader, Tlv};
pub use jws::{verify_compact_jws, VerifiedJws};
pub use x509::{verify_chain, verify_signature, Certificate, Extension, SignatureScheme};

/// Errors raised by the helpers in this module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("system random source failed")]
    Random,

    #[error("DER parse error: {0}")]
    Der(#[from] DerError),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("certificate chain did not verify: {0}")]
    Chain(String),

    #[error("JWS error: {0}")]
    Jws(String),
}

impl From<openssl::error::ErrorStack> for CryptoError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        CryptoError::Certificate(err.to_string())
    }
}

/// Digest algorithms used across attestation formats and OTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn ring_algorithm(self) -> &'static digest::Algorithm {
        match self {
            HashAlgorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            HashAlgorithm::Sha256 => &digest::SHA256,
            HashAlgorithm::Sha384 => &digest::SHA384,
            HashAlgorithm::Sha512 => &digest::SHA512,
        }
    }

    #[must_use]
    pub fn output_len(self) -> usize {
        self.ring_algorithm().output_len()
    }
}

/// Hash `data` with the given algorithm
#[must_use]
pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    digest::digest(algorithm.ring_algorithm(), data)
        .as_ref()
        .to_vec()
}

/// SHA-256 digest
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

/// Fill a buffer of `len` bytes from the system CSPRNG
///
/// # Errors
/// Returns `CryptoError::Random` if the OS random source is unavailable.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CryptoError::Random)?;
    Ok(bytes)
}

/// Generate a ceremony challenge of `size` bytes
///
/// # Errors
/// Returns `CryptoError::Random` if the OS random source is unavailable.
pub fn generate_challenge(size: usize) -> Result<Vec<u8>, CryptoError> {
    random_bytes(size)
}

/// Generate a 16-byte opaque user handle
///
/// # Errors
/// Returns `CryptoError::Random` if the OS random source is unavailable.
pub fn generate_user_handle() -> Result<Vec<u8>, CryptoError> {
    random_bytes(16)
}

/// Constant-time comparison of two byte strings
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_challenge_length_and_uniqueness() {
        let a = generate_challenge(32).unwrap();
        let b = generate_challenge(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_lengths() {
        assert_eq!(hash(HashAlgorithm::Sha1, b"abc").len(), 20);
        assert_eq!(hash(HashAlgorithm::Sha384, b"abc").len(), 48);
        assert_eq!(HashAlgorithm::Sha512.output_len(), 64);
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(digest[..4], [0xba, 0x78, 0x16, 0xbf]);
        assert_eq!(digest.to_vec(), hash(HashAlgorithm::Sha256, b"abc"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sama"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
