//! Passkey factor service
//!
//! Wires the stateless verifiers to the challenge cache, the credential
//! store and the user directory. This is the layer that logs ceremony
//! failures and persists verified results.

use std::sync::Arc;

use log::debug;

use super::errors::PasskeyError;
use super::session::{ChallengeCache, PendingCeremony};
use super::settings::ChallengeSettings;
use crate::metadata::TrustSource;
use crate::store::{CredentialStore, StoreError, UserDirectory};
use crate::utils::LoggingHelper;
use crate::webauthn::{
    AuthenticationOptions, AuthenticationResponse, RegistrationOptions, RegistrationResponse,
    User, UserCredential, VerifiedAssertion, VerifiedCredential, VerifyError, WebAuthnService,
};

/// Options handed to the client, with the session id to complete them under
#[derive(Debug, Clone)]
pub struct CeremonyStart<T> {
    pub session_id: String,
    pub options: T,
}

/// Registration and authentication with passkeys for directory users
#[derive(Clone)]
pub struct PasskeyFactor {
    webauthn: WebAuthnService,
    store: Arc<dyn CredentialStore>,
    directory: Arc<dyn UserDirectory>,
    trust: Arc<dyn TrustSource>,
    challenges: Arc<ChallengeCache>,
}

impl std::fmt::Debug for PasskeyFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyFactor")
            .field("webauthn", &self.webauthn)
            .field("pending_sessions", &self.challenges.len())
            .finish_non_exhaustive()
    }
}

impl PasskeyFactor {
    #[must_use]
    pub fn new(
        webauthn: WebAuthnService,
        store: Arc<dyn CredentialStore>,
        directory: Arc<dyn UserDirectory>,
        trust: Arc<dyn TrustSource>,
        challenges: &ChallengeSettings,
    ) -> Self {
        Self {
            webauthn,
            store,
            directory,
            trust,
            challenges: Arc::new(ChallengeCache::with_sweep_interval(
                challenges.expiry(),
                challenges.cleanup_interval(),
            )),
        }
    }

    #[must_use]
    pub fn challenges(&self) -> &ChallengeCache {
        &self.challenges
    }

    async fn user(&self, upn: &str) -> Result<User, PasskeyError> {
        self.directory
            .get_user(upn)
            .await?
            .ok_or_else(|| PasskeyError::UnknownUser(upn.to_string()))
    }

    fn new_session(&self, ceremony: PendingCeremony) -> Result<String, PasskeyError> {
        let session_id = ChallengeCache::new_session_id()
            .map_err(|e| PasskeyError::Verify(VerifyError::from(e)))?;
        self.challenges.insert(&session_id, ceremony);
        Ok(session_id)
    }

    fn take_session(&self, session_id: &str) -> Result<PendingCeremony, PasskeyError> {
        self.challenges.take(session_id).ok_or_else(|| {
            LoggingHelper::log_session_missing(session_id);
            PasskeyError::SessionNotFound
        })
    }

    /// Issue registration options for a directory user
    ///
    /// The user's existing credentials are excluded.
    ///
    /// # Errors
    /// `UnknownUser`, store failures or a random source failure.
    pub async fn begin_registration(
        &self,
        upn: &str,
    ) -> Result<CeremonyStart<RegistrationOptions>, PasskeyError> {
        let user = self.user(upn).await?;
        let existing = self.store.credentials_by_user(&user.id).await?;
        let options = self.webauthn.start_registration(&user, &existing)?;
        let session_id = self.new_session(PendingCeremony::Registration {
            upn: upn.to_string(),
            options: options.clone(),
        })?;
        Ok(CeremonyStart {
            session_id,
            options,
        })
    }

    /// Verify a registration response and store the new credential
    ///
    /// # Errors
    /// `SessionNotFound` for unknown, used or expired sessions, `Verify` for
    /// any verification failure, `Store` if the uniqueness lookup fails.
    /// Nothing is stored unless verification passes.
    pub async fn complete_registration(
        &self,
        session_id: &str,
        response: &RegistrationResponse,
    ) -> Result<VerifiedCredential, PasskeyError> {
        let (upn, options) = match self.take_session(session_id)? {
            PendingCeremony::Registration { upn, options } => (upn, options),
            other => {
                return Err(PasskeyError::WrongCeremony {
                    expected: "registration",
                    actual: other.name(),
                })
            }
        };

        // The verifier checks rawId against the attested id before asking
        let owners = self
            .store
            .users_by_credential_id(&response.raw_id)
            .await
            .inspect_err(|e| LoggingHelper::log_store_failure(&upn, "registration", e))?;
        let result = self
            .webauthn
            .finish_registration(response, &options, self.trust.as_ref(), |_| async move {
                owners.is_empty()
            })
            .await;

        let verified = match result {
            Ok(verified) => verified,
            Err(err) => {
                LoggingHelper::log_registration_failure(&upn, &err);
                return Err(err.into());
            }
        };

        match self.store.add_credential(verified.credential.clone()).await {
            Ok(()) => {}
            Err(StoreError::DuplicateCredential) => {
                LoggingHelper::log_registration_failure(&upn, &VerifyError::DuplicateCredential);
                return Err(VerifyError::DuplicateCredential.into());
            }
            Err(err) => {
                LoggingHelper::log_store_failure(&upn, "registration", &err);
                return Err(err.into());
            }
        }
        LoggingHelper::log_registration_success(&upn, &verified);
        Ok(verified)
    }

    /// Issue authentication options listing the user's credentials
    ///
    /// # Errors
    /// `UnknownUser`, store failures or a random source failure.
    pub async fn begin_authentication(
        &self,
        upn: &str,
    ) -> Result<CeremonyStart<AuthenticationOptions>, PasskeyError> {
        let user = self.user(upn).await?;
        let credentials = self.store.credentials_by_user(&user.id).await?;
        let options = self.webauthn.start_authentication(&credentials)?;
        let session_id = self.new_session(PendingCeremony::Authentication {
            upn: upn.to_string(),
            options: options.clone(),
        })?;
        Ok(CeremonyStart {
            session_id,
            options,
        })
    }

    /// Verify an assertion and advance the stored counter
    ///
    /// # Errors
    /// `SessionNotFound` for unknown, used or expired sessions, `Verify` for
    /// any verification failure including counter replay.
    pub async fn complete_authentication(
        &self,
        session_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<VerifiedAssertion, PasskeyError> {
        let (upn, options) = match self.take_session(session_id)? {
            PendingCeremony::Authentication { upn, options } => (upn, options),
            other => {
                return Err(PasskeyError::WrongCeremony {
                    expected: "authentication",
                    actual: other.name(),
                })
            }
        };

        let user = self.user(&upn).await?;
        let Some(stored) = self
            .store
            .credential_by_id(&response.raw_id)
            .await?
            .filter(|c| c.user_handle == user.id)
        else {
            LoggingHelper::log_authentication_failure(&upn, &VerifyError::UnknownCredential);
            return Err(VerifyError::UnknownCredential.into());
        };

        let owners = self.store.users_by_credential_id(stored.id()).await?;
        let result = self
            .webauthn
            .finish_authentication(response, &options, &stored, |handle, _| {
                owners.iter().any(|owner| owner.as_slice() == handle)
            });

        let assertion = match result {
            Ok(assertion) => assertion,
            Err(err) => {
                LoggingHelper::log_authentication_failure(&upn, &err);
                return Err(err.into());
            }
        };

        match self
            .store
            .update_counter(&assertion.credential_id, assertion.new_counter)
            .await
        {
            Ok(()) => {}
            // A concurrent assertion advanced the counter past this one
            Err(StoreError::CounterRegression { stored, attempted }) => {
                let err = VerifyError::ReplayDetected {
                    stored,
                    received: attempted,
                };
                LoggingHelper::log_authentication_failure(&upn, &err);
                return Err(err.into());
            }
            Err(err) => {
                LoggingHelper::log_store_failure(&upn, "authentication", &err);
                return Err(err.into());
            }
        }
        LoggingHelper::log_authentication_success(&upn, &assertion);
        Ok(assertion)
    }

    /// Remove one of the user's credentials; `false` if it was not theirs
    ///
    /// # Errors
    /// `UnknownUser` or store failures.
    pub async fn remove_credential(
        &self,
        upn: &str,
        credential_id: &[u8],
    ) -> Result<bool, PasskeyError> {
        let user = self.user(upn).await?;
        let removed = self.store.remove_credential(&user.id, credential_id).await?;
        debug!(
            "Credential {} removal for {upn}: {removed}",
            LoggingHelper::credential_label(credential_id)
        );
        Ok(removed)
    }

    /// The user's registered credentials, oldest first
    ///
    /// # Errors
    /// `UnknownUser` or store failures.
    pub async fn list_credentials(&self, upn: &str) -> Result<Vec<UserCredential>, PasskeyError> {
        let user = self.user(upn).await?;
        Ok(self.store.credentials_by_user(&user.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EmptyTrustSource;
    use crate::store::{MemoryCredentialStore, MemoryUserDirectory};
    use crate::testing::constants::{TEST_RP_ID, TEST_UPN};
    use crate::testing::{Attestation, SoftAuthenticator, TestKey, DEFAULT_ORIGIN};
    use crate::webauthn::WebAuthnSettings;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store that can fail lookups or serve counters read before a commit
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryCredentialStore,
        fail_lookups: AtomicBool,
        stale_reads: AtomicBool,
    }

    #[async_trait]
    impl CredentialStore for FlakyStore {
        async fn credentials_by_user(&self, user_handle: &[u8]) -> Result<Vec<UserCredential>, StoreError> {
            self.inner.credentials_by_user(user_handle).await
        }

        async fn credential_by_id(&self, credential_id: &[u8]) -> Result<Option<UserCredential>, StoreError> {
            let mut found = self.inner.credential_by_id(credential_id).await?;
            if self.stale_reads.load(Ordering::SeqCst) {
                if let Some(credential) = found.as_mut() {
                    credential.signature_counter = 0;
                }
            }
            Ok(found)
        }

        async fn users_by_credential_id(&self, credential_id: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.users_by_credential_id(credential_id).await
        }

        async fn add_credential(&self, credential: UserCredential) -> Result<(), StoreError> {
            self.inner.add_credential(credential).await
        }

        async fn update_counter(&self, credential_id: &[u8], counter: u32) -> Result<(), StoreError> {
            self.inner.update_counter(credential_id, counter).await
        }

        async fn remove_credential(&self, user_handle: &[u8], credential_id: &[u8]) -> Result<bool, StoreError> {
            self.inner.remove_credential(user_handle, credential_id).await
        }
    }

    fn factor() -> (PasskeyFactor, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        (factor_with(store.clone(), &ChallengeSettings::default()), store)
    }

    fn factor_with(store: Arc<dyn CredentialStore>, challenges: &ChallengeSettings) -> PasskeyFactor {
        let directory = Arc::new(MemoryUserDirectory::new());
        directory.add_user(TEST_UPN, "Alice").unwrap();
        let webauthn = WebAuthnService::new(WebAuthnSettings {
            rp_id: TEST_RP_ID.to_string(),
            rp_origin: DEFAULT_ORIGIN.to_string(),
            ..WebAuthnSettings::default()
        })
        .unwrap();
        PasskeyFactor::new(
            webauthn,
            store,
            directory,
            Arc::new(EmptyTrustSource),
            challenges,
        )
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let (factor, _) = factor();
        let authenticator = SoftAuthenticator::new(TestKey::es256());
        let start = factor.begin_registration(TEST_UPN).await.unwrap();
        let response = authenticator.register(&start.options, Attestation::None);

        factor
            .complete_registration(&start.session_id, &response)
            .await
            .unwrap();
        assert_eq!(
            factor
                .complete_registration(&start.session_id, &response)
                .await
                .unwrap_err(),
            PasskeyError::SessionNotFound
        );
    }

    #[tokio::test]
    async fn test_failed_registration_stores_nothing() {
        let (factor, store) = factor();
        let authenticator = SoftAuthenticator::new(TestKey::es256()).with_origin("https://evil.example");
        let start = factor.begin_registration(TEST_UPN).await.unwrap();
        let response = authenticator.register(&start.options, Attestation::None);

        let err = factor
            .complete_registration(&start.session_id, &response)
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::Verify(VerifyError::OriginMismatch(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_bound_to_their_ceremony() {
        let (factor, _) = factor();
        let mut authenticator = SoftAuthenticator::new(TestKey::es256());
        let start = factor.begin_authentication(TEST_UPN).await.unwrap();
        let response = authenticator.authenticate(&start.options, None);
        let registration = SoftAuthenticator::new(TestKey::es256())
            .register(&factor.begin_registration(TEST_UPN).await.unwrap().options, Attestation::None);

        assert!(matches!(
            factor
                .complete_registration(&start.session_id, &registration)
                .await,
            Err(PasskeyError::WrongCeremony { .. })
        ));
        // The mismatched attempt consumed the session
        assert_eq!(
            factor
                .complete_authentication(&start.session_id, &response)
                .await
                .unwrap_err(),
            PasskeyError::SessionNotFound
        );
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (factor, _) = factor();
        assert_eq!(
            factor.begin_registration("bob@good.example").await.unwrap_err(),
            PasskeyError::UnknownUser("bob@good.example".to_string())
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_not_reported_as_duplicate() {
        let store = Arc::new(FlakyStore::default());
        let factor = factor_with(store.clone(), &ChallengeSettings::default());
        store.fail_lookups.store(true, Ordering::SeqCst);

        let authenticator = SoftAuthenticator::new(TestKey::es256());
        let start = factor.begin_registration(TEST_UPN).await.unwrap();
        let response = authenticator.register(&start.options, Attestation::None);
        assert_eq!(
            factor
                .complete_registration(&start.session_id, &response)
                .await
                .unwrap_err(),
            PasskeyError::Store(StoreError::Backend("connection reset".to_string()))
        );
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_racing_equal_counters_commit_once() {
        let store = Arc::new(FlakyStore::default());
        let factor = factor_with(store.clone(), &ChallengeSettings::default());
        let mut first = SoftAuthenticator::new(TestKey::es256());
        let start = factor.begin_registration(TEST_UPN).await.unwrap();
        factor
            .complete_registration(&start.session_id, &first.register(&start.options, Attestation::None))
            .await
            .unwrap();
        let mut cloned = first.clone();

        let start_a = factor.begin_authentication(TEST_UPN).await.unwrap();
        let start_b = factor.begin_authentication(TEST_UPN).await.unwrap();
        let response_a = first.authenticate(&start_a.options, None);
        let response_b = cloned.authenticate(&start_b.options, None);

        factor
            .complete_authentication(&start_a.session_id, &response_a)
            .await
            .unwrap();
        // The second verification still sees the counter from before the first commit
        store.stale_reads.store(true, Ordering::SeqCst);
        assert_eq!(
            factor
                .complete_authentication(&start_b.session_id, &response_b)
                .await
                .unwrap_err(),
            PasskeyError::Verify(VerifyError::ReplayDetected {
                stored: 1,
                received: 1
            })
        );
    }

    #[tokio::test]
    async fn test_abandoned_sessions_are_evicted() {
        let settings = ChallengeSettings {
            expiry_seconds: 0,
            cleanup_interval_seconds: 0,
        };
        let factor = factor_with(Arc::new(MemoryCredentialStore::new()), &settings);
        for _ in 0..5 {
            factor.begin_registration(TEST_UPN).await.unwrap();
        }
        assert_eq!(factor.challenges().len(), 1);
    }
}
