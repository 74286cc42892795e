//! Multi-factor authentication building blocks
//!
//! Passkey (`WebAuthn`) registration and assertion verification with
//! attestation trust through authenticator metadata, plus TOTP/HOTP one-time
//! passwords. Storage and transport stay with the host: credentials and users
//! are reached through the traits in [`store`].

#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the webauthn-mfa crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cbor;
pub mod crypto;
pub mod metadata;
pub mod otp;
pub mod passkey;
pub mod settings;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;
pub mod webauthn;

/// Re-export commonly used items
pub use metadata::{MetadataService, TrustSource};
pub use otp::{Hotp, Totp};
pub use passkey::{PasskeyError, PasskeyFactor};
pub use settings::ProviderSettings;
pub use store::{CredentialStore, UserDirectory};
pub use webauthn::{VerifyError, WebAuthnService};
