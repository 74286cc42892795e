use thiserror::Error;

/// Errors raised while configuring OTP factors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("OTP codes must have 6 to 8 digits, not {0}")]
    InvalidDigits(u32),

    #[error("TOTP period must be at least one second")]
    InvalidPeriod,

    #[error("invalid base32 secret: {0}")]
    InvalidSecret(String),

    #[error("system random source failed")]
    Random,

    #[error("cannot build provisioning URI: {0}")]
    Uri(String),
}
