//! Refreshable trust metadata cache
//!
//! Readers take a short read lock and always see a complete set, possibly
//! stale up to the configured maximum. A refresh fetches every source without holding the cache lock and
//! swaps the new map in under a brief write lock. Only one refresh runs at a
//! time; a second request returns `RefreshInProgress` instead of queueing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::MetadataError;
use super::settings::MetadataSettings;
use super::source::{FileSource, MdsBlobSource, MetadataSource};
use super::types::TrustEntry;
use crate::crypto::Certificate;

/// Lookup of trust anchors by authenticator model
#[async_trait]
pub trait TrustSource: Send + Sync {
    async fn get_metadata(&self, aaguid: Uuid) -> Option<Arc<TrustEntry>>;
}

/// A trust source that knows no authenticators
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTrustSource;

#[async_trait]
impl TrustSource for EmptyTrustSource {
    async fn get_metadata(&self, _aaguid: Uuid) -> Option<Arc<TrustEntry>> {
        None
    }
}

struct MetadataCache {
    entries: HashMap<Uuid, Arc<TrustEntry>>,
    last_updated: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    refresh_interval: Duration,
    retry_backoff: Duration,
    max_staleness: Duration,
}

impl MetadataCache {
    fn new(refresh_interval: Duration, retry_backoff: Duration, max_staleness: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            last_updated: None,
            last_failure: None,
            refresh_interval,
            retry_backoff,
            max_staleness,
        }
    }

    fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_updated.map(|updated| {
            now.signed_duration_since(updated)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age(now).is_none_or(|age| age >= self.refresh_interval)
    }

    /// Past the maximum staleness the cached set is no evidence of trust
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now).is_some_and(|age| age >= self.max_staleness)
    }

    fn lookup(&self, aaguid: Uuid, now: DateTime<Utc>) -> Option<Arc<TrustEntry>> {
        if self.is_expired(now) {
            return None;
        }
        self.entries.get(&aaguid).cloned()
    }

    fn should_retry(&self, now: DateTime<Utc>) -> bool {
        self.last_failure.is_none_or(|failed| {
            now.signed_duration_since(failed)
                .to_std()
                .unwrap_or(Duration::ZERO)
                >= self.retry_backoff
        })
    }

    fn store(&mut self, entries: HashMap<Uuid, Arc<TrustEntry>>) {
        self.entries = entries;
        self.last_updated = Some(Utc::now());
        self.last_failure = None;
    }

    fn record_failure(&mut self) {
        self.last_failure = Some(Utc::now());
    }
}

struct Inner {
    sources: Vec<Arc<dyn MetadataSource>>,
    cache: RwLock<MetadataCache>,
    refresh_lock: Mutex<()>,
    ready: watch::Sender<bool>,
    fetch_timeout: Duration,
    refresh_interval: Duration,
}

/// Metadata/trust service backed by one or more sources
#[derive(Clone)]
pub struct MetadataService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("sources", &self.inner.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl MetadataService {
    /// Create a service over the given sources; nothing is fetched yet
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn MetadataSource>>, settings: &MetadataSettings) -> Self {
        let refresh_interval = Duration::from_secs(settings.refresh_interval_seconds.max(1));
        let max_staleness =
            Duration::from_secs(settings.max_staleness_seconds).max(refresh_interval);
        let (ready, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                sources,
                cache: RwLock::new(MetadataCache::new(
                    refresh_interval,
                    Duration::from_secs(settings.retry_backoff_seconds),
                    max_staleness,
                )),
                refresh_lock: Mutex::new(()),
                ready,
                fetch_timeout: Duration::from_secs(settings.fetch_timeout_seconds.max(1)),
                refresh_interval,
            }),
        }
    }

    /// Build the sources named by the settings
    ///
    /// # Errors
    /// Returns an error if a configured root certificate cannot be read.
    pub fn from_settings(settings: &MetadataSettings) -> Result<Self, MetadataError> {
        let mut sources: Vec<Arc<dyn MetadataSource>> = Vec::new();

        if let Some(path) = &settings.local_metadata_path {
            sources.push(Arc::new(FileSource::new(path)));
        }

        if settings.enabled {
            let mds = match &settings.mds_root_certificate {
                Some(path) => {
                    let pem = std::fs::read(path)?;
                    MdsBlobSource::new(&settings.mds_url, vec![Certificate::from_pem(&pem)?])
                }
                None => MdsBlobSource::with_fido_root(&settings.mds_url)?,
            };
            sources.push(Arc::new(mds));
        }

        Ok(Self::new(sources, settings))
    }

    /// Fetch every source and replace the cache
    ///
    /// Entries from later sources win for the same AAGUID. The cache is
    /// replaced if at least one source succeeded.
    ///
    /// # Errors
    /// `RefreshInProgress` if another refresh holds the writer guard, otherwise
    /// the last source error when every source failed.
    pub async fn refresh(&self) -> Result<usize, MetadataError> {
        let Ok(_guard) = self.inner.refresh_lock.try_lock() else {
            debug!("⏳ Metadata refresh already running");
            return Err(MetadataError::RefreshInProgress);
        };

        let mut merged = HashMap::new();
        let mut last_error = None;
        let mut succeeded = self.inner.sources.is_empty();

        for source in &self.inner.sources {
            match tokio::time::timeout(self.inner.fetch_timeout, source.fetch()).await {
                Ok(Ok(entries)) => {
                    debug!("📥 {} entries from {} metadata", entries.len(), source.name());
                    succeeded = true;
                    for entry in entries {
                        merged.insert(entry.aaguid, Arc::new(entry));
                    }
                }
                Ok(Err(e)) => {
                    warn!("⚠️ {} metadata fetch failed: {e}", source.name());
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(
                        "⚠️ {} metadata fetch timed out after {:?}",
                        source.name(),
                        self.inner.fetch_timeout
                    );
                    last_error = Some(MetadataError::Timeout(self.inner.fetch_timeout.as_secs()));
                }
            }
        }

        if !succeeded {
            self.inner.cache.write().await.record_failure();
            return Err(last_error
                .unwrap_or_else(|| MetadataError::Fetch("no source succeeded".to_string())));
        }

        let count = merged.len();
        self.inner.cache.write().await.store(merged);
        self.inner.ready.send_replace(true);
        info!("✅ Metadata refreshed: {count} authenticator models");
        Ok(count)
    }

    /// Wait for the first successful load, at most `timeout`
    ///
    /// Returns whether the service is ready.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut receiver = self.inner.ready.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Refresh now and then every refresh interval
    ///
    /// Abort the returned handle to stop refreshing.
    #[must_use]
    pub fn spawn_refresh_task(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.inner.refresh_interval);
            loop {
                interval.tick().await;
                if let Err(e) = service.refresh().await {
                    warn!("⚠️ Scheduled metadata refresh failed: {e}");
                }
            }
        })
    }

    pub async fn entry_count(&self) -> usize {
        self.inner.cache.read().await.entries.len()
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.read().await.last_updated
    }
}

#[async_trait]
impl TrustSource for MetadataService {
    async fn get_metadata(&self, aaguid: Uuid) -> Option<Arc<TrustEntry>> {
        let now = Utc::now();
        let (entry, refresh_due) = {
            let cache = self.inner.cache.read().await;
            if cache.is_expired(now) {
                debug!("Metadata last refreshed {:?} ago, not serving it", cache.age(now));
            }
            (
                cache.lookup(aaguid, now),
                cache.is_stale(now) && cache.should_retry(now),
            )
        };

        if refresh_due && !self.inner.sources.is_empty() {
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service.refresh().await {
                    debug!("Background metadata refresh did not complete: {e}");
                }
            });
        }

        entry
    }
}
