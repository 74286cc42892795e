//! Pending ceremony cache
//!
//! Options issued by `begin_*` are parked here under a random session id
//! until the matching `complete_*` call takes them. Entries are single-use
//! and expire after the configured lifetime. Abandoned entries are swept
//! by `insert` once per sweep interval.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;

use crate::crypto::{self, CryptoError};
use crate::webauthn::{base64url, AuthenticationOptions, RegistrationOptions};

/// Options waiting for the client response
#[derive(Debug, Clone)]
pub enum PendingCeremony {
    Registration {
        upn: String,
        options: RegistrationOptions,
    },
    Authentication {
        upn: String,
        options: AuthenticationOptions,
    },
}

impl PendingCeremony {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PendingCeremony::Registration { .. } => "registration",
            PendingCeremony::Authentication { .. } => "authentication",
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    ceremony: PendingCeremony,
    expires_at: DateTime<Utc>,
}

/// Concurrent single-use store of pending ceremonies
#[derive(Debug)]
pub struct ChallengeCache {
    entries: DashMap<String, CacheEntry>,
    ttl: chrono::Duration,
    sweep_interval_millis: i64,
    /// Unix milliseconds after which the next `insert` sweeps
    next_sweep_at: AtomicI64,
}

impl ChallengeCache {
    /// Cache sweeping at most once per `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_sweep_interval(ttl, ttl)
    }

    #[must_use]
    pub fn with_sweep_interval(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650)),
            sweep_interval_millis: i64::try_from(sweep_interval.as_millis()).unwrap_or(i64::MAX),
            next_sweep_at: AtomicI64::new(0),
        }
    }

    /// Random, URL-safe session id
    ///
    /// # Errors
    /// Fails only if the system random source fails.
    pub fn new_session_id() -> Result<String, CryptoError> {
        Ok(base64url::encode(&crypto::random_bytes(18)?))
    }

    pub fn insert(&self, session_id: &str, ceremony: PendingCeremony) {
        self.sweep_if_due();
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            session_id.to_string(),
            CacheEntry {
                ceremony,
                expires_at,
            },
        );
    }

    /// Remove and return the ceremony; `None` if unknown, used or expired
    pub fn take(&self, session_id: &str) -> Option<PendingCeremony> {
        let (_, entry) = self.entries.remove(session_id)?;
        if entry.expires_at <= Utc::now() {
            debug!("Discarding expired {} session", entry.ceremony.name());
            return None;
        }
        Some(entry.ceremony)
    }

    /// Run `cleanup_expired` if the sweep interval has passed
    ///
    /// Only the caller that advances the deadline sweeps.
    fn sweep_if_due(&self) {
        let now = Utc::now().timestamp_millis();
        let due = self.next_sweep_at.load(Ordering::Acquire);
        if now < due {
            return;
        }
        let next = now.saturating_add(self.sweep_interval_millis);
        if self
            .next_sweep_at
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.cleanup_expired();
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("🧹 Removed {removed} expired ceremony sessions");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
