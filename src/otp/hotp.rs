//! RFC 4226 counter-based one-time passwords

use ring::hmac;
use serde::{Deserialize, Serialize};

use super::OtpError;
use crate::crypto::constant_time_eq;

/// HMAC digest behind the one-time password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OtpAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl OtpAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Self::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => hmac::HMAC_SHA256,
            Self::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

/// Keyed code generator shared by HOTP and TOTP
#[derive(Debug, Clone)]
pub(super) struct CodeGenerator {
    key: hmac::Key,
    digits: u32,
}

impl CodeGenerator {
    pub(super) fn new(secret: &[u8], digits: u32, algorithm: OtpAlgorithm) -> Result<Self, OtpError> {
        if !(6..=8).contains(&digits) {
            return Err(OtpError::InvalidDigits(digits));
        }
        Ok(Self {
            key: hmac::Key::new(algorithm.hmac_algorithm(), secret),
            digits,
        })
    }

    pub(super) fn digits(&self) -> u32 {
        self.digits
    }

    /// Dynamic truncation of `HMAC(secret, counter)`
    pub(super) fn generate(&self, counter: u64) -> String {
        let tag = hmac::sign(&self.key, &counter.to_be_bytes());
        let mac = tag.as_ref();
        let offset = usize::from(mac[mac.len() - 1] & 0x0f);
        let binary = u32::from_be_bytes([
            mac[offset] & 0x7f,
            mac[offset + 1],
            mac[offset + 2],
            mac[offset + 3],
        ]);
        let code = binary % 10u32.pow(self.digits);
        format!("{code:0width$}", width = self.digits as usize)
    }

    pub(super) fn matches(&self, code: &str, counter: u64) -> bool {
        constant_time_eq(code.trim().as_bytes(), self.generate(counter).as_bytes())
    }
}

/// Counter-based one-time passwords with a look-ahead window
#[derive(Debug, Clone)]
pub struct Hotp {
    generator: CodeGenerator,
    look_ahead: u64,
}

impl Hotp {
    /// # Errors
    /// `InvalidDigits` outside 6..=8.
    pub fn new(secret: &[u8], digits: u32, algorithm: OtpAlgorithm) -> Result<Self, OtpError> {
        Ok(Self {
            generator: CodeGenerator::new(secret, digits, algorithm)?,
            look_ahead: 10,
        })
    }

    #[must_use]
    pub fn with_look_ahead(mut self, look_ahead: u64) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    #[must_use]
    pub fn generate(&self, counter: u64) -> String {
        self.generator.generate(counter)
    }

    /// Check `code` against `counter..=counter + look_ahead`
    ///
    /// Returns the counter to store for the next verification.
    #[must_use]
    pub fn verify(&self, code: &str, counter: u64) -> Option<u64> {
        (0..=self.look_ahead)
            .map_while(|offset| counter.checked_add(offset))
            .find(|candidate| self.generator.matches(code, *candidate))
            .map(|matched| matched.saturating_add(1))
    }
}
