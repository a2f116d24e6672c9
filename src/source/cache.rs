//! Process-wide workbook cache.
//!
//! Lifecycle: the first [`WorkbookCache::get`] fetches from the data source
//! and stores a [`Snapshot`]. Later calls share it until it expires (only
//! when a TTL is configured) or [`WorkbookCache::invalidate`] is called by
//! the refresh action. Invalidation bumps a generation counter; a fetch
//! that started under an older generation is discarded and redone, so a
//! refresh is never undone by a slow in-flight download.
//!
//! Misses are single-flight: concurrent callers wait for one fetch.
//! Failures are not cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::retry::RetryPolicy;
use crate::roster::Workbook;

use super::{DataSource, SourceError};

/// A cached workbook and the refresh generation it was fetched under.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Shared decoded workbook.
    pub workbook: Arc<Workbook>,
    /// Refresh generation at fetch time.
    pub generation: u64,
    /// Wall-clock fetch time.
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    snapshot: Snapshot,
    loaded_at: Instant,
}

/// Memoising front for a [`DataSource`].
pub struct WorkbookCache {
    source: Arc<dyn DataSource>,
    ttl: Option<Duration>,
    fetch_timeout: Duration,
    retry: RetryPolicy,
    slot: RwLock<Option<Entry>>,
    fill: Mutex<()>,
    generation: AtomicU64,
}

impl std::fmt::Debug for WorkbookCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookCache")
            .field("source", &self.source.describe())
            .field("ttl", &self.ttl)
            .field("generation", &self.generation())
            .finish()
    }
}

impl WorkbookCache {
    /// Create an empty cache in front of `source`.
    pub fn new(
        source: Arc<dyn DataSource>,
        ttl: Option<Duration>,
        fetch_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout,
            retry,
            slot: RwLock::new(None),
            fill: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Create a cache from `[cache]` settings.
    pub fn from_config(source: Arc<dyn DataSource>, config: &CacheConfig) -> Self {
        Self::new(
            source,
            config.ttl_seconds.map(Duration::from_secs),
            Duration::from_secs(config.fetch_timeout_seconds),
            config.retry,
        )
    }

    /// Current refresh generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Description of the underlying source.
    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Return the cached workbook, fetching it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the last [`SourceError`] once retries are exhausted.
    pub async fn get(&self) -> Result<Snapshot, SourceError> {
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        let _fill = self.fill.lock().await;
        loop {
            if let Some(snapshot) = self.fresh().await {
                debug!("workbook filled by concurrent request");
                return Ok(snapshot);
            }

            let generation = self.generation();
            let workbook = self.fetch().await?;
            let snapshot = Snapshot {
                workbook: Arc::new(workbook),
                generation,
                fetched_at: Utc::now(),
            };

            let mut slot = self.slot.write().await;
            if self.generation() != generation {
                debug!(generation, "refresh during fetch, discarding stale workbook");
                continue;
            }
            *slot = Some(Entry {
                snapshot: snapshot.clone(),
                loaded_at: Instant::now(),
            });
            info!(
                generation,
                participants = snapshot.workbook.participants.len(),
                source = %self.source.describe(),
                "workbook cached"
            );
            return Ok(snapshot);
        }
    }

    /// Drop the cached workbook and start a new refresh generation.
    ///
    /// Returns the new generation.
    pub async fn invalidate(&self) -> u64 {
        let mut slot = self.slot.write().await;
        let next = self
            .generation
            .fetch_add(1, Ordering::SeqCst)
            .wrapping_add(1);
        *slot = None;
        info!(generation = next, "workbook cache invalidated");
        next
    }

    async fn fresh(&self) -> Option<Snapshot> {
        let slot = self.slot.read().await;
        let entry = slot.as_ref()?;
        if entry.snapshot.generation != self.generation() {
            return None;
        }
        if let Some(ttl) = self.ttl {
            if entry.loaded_at.elapsed() >= ttl {
                debug!(ttl_secs = ttl.as_secs(), "cached workbook expired");
                return None;
            }
        }
        Some(entry.snapshot.clone())
    }

    async fn fetch(&self) -> Result<Workbook, SourceError> {
        let timeout = self.fetch_timeout;
        self.retry
            .run("workbook fetch", SourceError::is_transient, move || async move {
                match tokio::time::timeout(timeout, self.source.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout(timeout)),
                }
            })
            .await
    }
}
