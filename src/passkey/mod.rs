//! Passkey factor for application integration
//!
//! This module connects the `WebAuthn` verifiers to pending-ceremony state,
//! credential storage and the user directory.

mod errors;
pub use errors::PasskeyError;

// Pending ceremony cache
mod session;
pub use session::{ChallengeCache, PendingCeremony};

mod settings;
pub use settings::ChallengeSettings;

// Service layer
mod service;
pub use service::{CeremonyStart, PasskeyFactor};
