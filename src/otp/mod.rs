//! One-time password factor (RFC 4226 HOTP, RFC 6238 TOTP)
//!
//! Secrets are raw bytes; [`base32`] converts them for authenticator apps.
//! Code delivery by e-mail or SMS is left to the host.

pub mod base32;
mod error;
mod hotp;
mod settings;
mod totp;

pub use error::OtpError;
pub use hotp::{Hotp, OtpAlgorithm};
pub use settings::OtpSettings;
pub use totp::{generate_secret, Totp};
