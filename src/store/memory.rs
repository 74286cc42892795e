//! In-memory store and directory backed by `DashMap`

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use super::{CredentialStore, StoreError, UserDirectory};
use crate::crypto;
use crate::webauthn::{User, UserCredential};

/// Credentials keyed by credential id
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<Vec<u8>, UserCredential>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn credentials_by_user(&self, user_handle: &[u8]) -> Result<Vec<UserCredential>, StoreError> {
        let mut found: Vec<UserCredential> = self
            .credentials
            .iter()
            .filter(|entry| entry.user_handle == user_handle)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|c| c.registration_date);
        Ok(found)
    }

    async fn credential_by_id(&self, credential_id: &[u8]) -> Result<Option<UserCredential>, StoreError> {
        Ok(self.credentials.get(credential_id).map(|c| c.value().clone()))
    }

    async fn users_by_credential_id(&self, credential_id: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .credentials
            .get(credential_id)
            .map(|c| vec![c.user_handle.clone()])
            .unwrap_or_default())
    }

    async fn add_credential(&self, credential: UserCredential) -> Result<(), StoreError> {
        match self.credentials.entry(credential.id().to_vec()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::DuplicateCredential),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(credential);
                Ok(())
            }
        }
    }

    async fn update_counter(&self, credential_id: &[u8], counter: u32) -> Result<(), StoreError> {
        let mut credential = self
            .credentials
            .get_mut(credential_id)
            .ok_or(StoreError::NotFound)?;
        let stored = credential.signature_counter;
        // Equal is only fine for authenticators that never count
        if counter < stored || (counter == stored && counter != 0) {
            return Err(StoreError::CounterRegression {
                stored,
                attempted: counter,
            });
        }
        credential.signature_counter = counter;
        Ok(())
    }

    async fn remove_credential(&self, user_handle: &[u8], credential_id: &[u8]) -> Result<bool, StoreError> {
        let removed = self
            .credentials
            .remove_if(credential_id, |_, c| c.user_handle == user_handle)
            .is_some();
        if removed {
            debug!("🗑️ Credential removed");
        }
        Ok(removed)
    }
}

/// Users keyed by case-folded principal name
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, User>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.name.to_lowercase(), user);
    }

    /// Add a user with a fresh random handle
    ///
    /// # Errors
    /// `Backend` if the system random source fails.
    pub fn add_user(&self, upn: &str, display_name: &str) -> Result<User, StoreError> {
        let id = crypto::generate_user_handle().map_err(|e| StoreError::Backend(e.to_string()))?;
        let user = User {
            id,
            name: upn.to_string(),
            display_name: display_name.to_string(),
        };
        self.insert(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_user(&self, upn: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&upn.to_lowercase()).map(|u| u.value().clone()))
    }
}
