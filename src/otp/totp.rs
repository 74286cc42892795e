//! RFC 6238 time-based one-time passwords

use chrono::{DateTime, Utc};
use url::Url;

use super::base32;
use super::hotp::{CodeGenerator, OtpAlgorithm};
use super::settings::OtpSettings;
use super::OtpError;

/// Time-based one-time passwords
///
/// Stateless: replay protection needs the last accepted step, which the
/// caller stores per user and passes to [`Totp::verify_once`].
#[derive(Debug, Clone)]
pub struct Totp {
    generator: CodeGenerator,
    secret: Vec<u8>,
    algorithm: OtpAlgorithm,
    period: i64,
    skew: i64,
}

impl Totp {
    /// # Errors
    /// `InvalidDigits` outside 6..=8, `InvalidPeriod` for a zero period.
    pub fn new(
        secret: &[u8],
        digits: u32,
        algorithm: OtpAlgorithm,
        period_seconds: u64,
    ) -> Result<Self, OtpError> {
        let period = i64::try_from(period_seconds)
            .ok()
            .filter(|p| *p > 0)
            .ok_or(OtpError::InvalidPeriod)?;
        Ok(Self {
            generator: CodeGenerator::new(secret, digits, algorithm)?,
            secret: secret.to_vec(),
            algorithm,
            period,
            skew: 1,
        })
    }

    /// Build from configured digits, algorithm, period and skew
    ///
    /// # Errors
    /// As for [`Totp::new`].
    pub fn from_settings(secret: &[u8], settings: &OtpSettings) -> Result<Self, OtpError> {
        Ok(Self::new(secret, settings.digits, settings.algorithm, settings.period_seconds)?
            .with_skew(settings.skew_periods))
    }

    /// Accept codes up to `periods` steps either side of the current one
    #[must_use]
    pub fn with_skew(mut self, periods: u32) -> Self {
        self.skew = i64::from(periods);
        self
    }

    /// Time step containing `at`
    #[must_use]
    pub fn step(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.period)
    }

    #[must_use]
    pub fn generate(&self, at: DateTime<Utc>) -> String {
        self.generate_step(self.step(at))
    }

    fn generate_step(&self, step: i64) -> String {
        self.generator.generate(u64::try_from(step).unwrap_or(0))
    }

    /// Returns the matched time step, trying the closest steps first
    #[must_use]
    pub fn verify(&self, code: &str, at: DateTime<Utc>) -> Option<i64> {
        let current = self.step(at);
        std::iter::once(0)
            .chain((1..=self.skew).flat_map(|d| [-d, d]))
            .map(|offset| current + offset)
            .filter(|step| *step >= 0)
            .find(|step| self.generator.matches(code, u64::try_from(*step).unwrap_or(0)))
    }

    /// Like [`Totp::verify`] but refuses steps not newer than `last_step`
    #[must_use]
    pub fn verify_once(&self, code: &str, at: DateTime<Utc>, last_step: Option<i64>) -> Option<i64> {
        self.verify(code, at)
            .filter(|step| last_step.is_none_or(|last| *step > last))
    }

    /// `otpauth://totp/` URI for authenticator app enrolment
    ///
    /// # Errors
    /// `Uri` if the URI cannot be assembled.
    pub fn provisioning_uri(&self, account: &str, issuer: &str) -> Result<Url, OtpError> {
        let mut url = Url::parse("otpauth://totp/").map_err(|e| OtpError::Uri(e.to_string()))?;
        url.set_path(&format!("{issuer}:{account}"));
        url.query_pairs_mut()
            .append_pair("secret", &base32::encode(&self.secret))
            .append_pair("issuer", issuer)
            .append_pair("algorithm", self.algorithm.as_str())
            .append_pair("digits", &self.generator.digits().to_string())
            .append_pair("period", &self.period.to_string());
        Ok(url)
    }
}

/// Fresh 160-bit secret from the system random source
///
/// # Errors
/// `Random` if the system random source fails.
pub fn generate_secret() -> Result<Vec<u8>, OtpError> {
    crate::crypto::random_bytes(20).map_err(|_| OtpError::Random)
}
