//! Credential persistence and user lookup
//!
//! The verifiers never touch storage. Callers read credentials through
//! [`CredentialStore`] and resolve principals through [`UserDirectory`], then
//! persist what the verifiers return.

mod error;
mod memory;

use async_trait::async_trait;

use crate::webauthn::{User, UserCredential};

pub use error::StoreError;
pub use memory::{MemoryCredentialStore, MemoryUserDirectory};

/// Persistent credential records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials registered to a user handle
    async fn credentials_by_user(&self, user_handle: &[u8]) -> Result<Vec<UserCredential>, StoreError>;

    async fn credential_by_id(&self, credential_id: &[u8]) -> Result<Option<UserCredential>, StoreError>;

    /// User handles that own a credential id (more than one means corruption)
    async fn users_by_credential_id(&self, credential_id: &[u8]) -> Result<Vec<Vec<u8>>, StoreError>;

    /// # Errors
    /// `DuplicateCredential` when the id is already stored.
    async fn add_credential(&self, credential: UserCredential) -> Result<(), StoreError>;

    /// # Errors
    /// `CounterRegression` if `counter` is below the stored value, or equal
    /// to a non-zero stored value; `NotFound` for an unknown id. The check and
    /// the write must be atomic so only one of two racing equal counters commits.
    async fn update_counter(&self, credential_id: &[u8], counter: u32) -> Result<(), StoreError>;

    /// Returns whether a credential was removed
    async fn remove_credential(&self, user_handle: &[u8], credential_id: &[u8]) -> Result<bool, StoreError>;
}

/// Resolves a user principal name to the `WebAuthn` user entity
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, upn: &str) -> Result<Option<User>, StoreError>;
}
