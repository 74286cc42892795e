//! Test support for verifier, store and passkey tests
//!
//! - [`keys`] - credential key pairs for every supported COSE algorithm
//! - [`certificates`] - throwaway attestation roots and leaf certificates
//! - [`authenticator`] - a software authenticator producing real responses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use webauthn_mfa::testing::{Attestation, SoftAuthenticator, TestKey};
//!
//! let authenticator = SoftAuthenticator::new(TestKey::es256());
//! let response = authenticator.register(&options, Attestation::None);
//! ```

pub mod authenticator;
pub mod certificates;
pub mod keys;

pub use authenticator::{Attestation, SoftAuthenticator, DEFAULT_ORIGIN};
pub use certificates::{sign_compact_jws, CertificateFactory, CertificateProfile, IssuedCertificate};
pub use keys::TestKey;

/// Common test constants
pub mod constants {
    /// Relying party id matching [`super::DEFAULT_ORIGIN`]
    pub const TEST_RP_ID: &str = "good.example";

    /// Origin no relying party in the tests accepts
    pub const EVIL_ORIGIN: &str = "https://evil.example";

    /// Default test user principal name
    pub const TEST_UPN: &str = "alice@good.example";

    /// RFC 6238 test secret (ASCII "12345678901234567890")
    pub const RFC6238_SECRET: &[u8] = b"12345678901234567890";
}
