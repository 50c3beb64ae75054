//! Key-addressed query cache.
//!
//! DESIGN
//! ======
//! The cache is the single owner of server-derived entities. Values are stored
//! type-erased behind [`QueryKey`]s but every read and write goes through a
//! typed [`Query<T>`], so callers never see an untyped value. Each entry keeps
//! its write time and an `invalidated` flag; an entry is stale when either is
//! past its query's staleness window.
//!
//! Every write, invalidation, removal or clear bumps a generation counter
//! published on a `watch` channel so dependents can recompute.
//!
//! TRADE-OFFS
//! ==========
//! Concurrent fetches of the same key are not coalesced. `clear` bumps an
//! epoch; a fetch that started before the clear drops its result instead of
//! writing data from a previous session into the new one.

pub mod helpers;
pub mod keys;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::net::error::ApiError;

pub use keys::{EntityKind, KeyMatch, Query, QueryKey, Relation};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

const DEFAULT_RETRY: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Freshness and retry policy for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a written value counts as fresh.
    pub stale_time: Duration,
    /// Additional attempts after a retryable failure.
    pub retry: u32,
    /// Base delay, doubled per attempt and capped at 30 s.
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { stale_time: Duration::ZERO, retry: DEFAULT_RETRY, retry_delay: DEFAULT_RETRY_DELAY }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    updated_at: Instant,
    invalidated: bool,
}

impl Entry {
    fn fresh(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self { value, updated_at: Instant::now(), invalidated: false }
    }

    fn is_stale(&self, stale_time: Duration, now: Instant) -> bool {
        self.invalidated || now.duration_since(self.updated_at) >= stale_time
    }
}

/// Captured pre-mutation state of one entry, for rollback.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    query: Query<T>,
    value: Option<T>,
    updated_at: Option<Instant>,
    invalidated: bool,
}

impl<T> Snapshot<T> {
    /// The captured value, `None` if the entry did not exist.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

// =============================================================================
// CACHE
// =============================================================================

pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    defaults: QueryOptions,
    epoch: AtomicU64,
    changes: watch::Sender<u64>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

impl QueryCache {
    #[must_use]
    pub fn new(defaults: QueryOptions) -> Self {
        let (changes, _) = watch::channel(0);
        Self { entries: Mutex::new(HashMap::new()), defaults, epoch: AtomicU64::new(0), changes }
    }

    #[must_use]
    pub fn defaults(&self) -> QueryOptions {
        self.defaults
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Receiver that changes whenever any entry changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Read the cached value regardless of staleness.
    #[must_use]
    pub fn get_query_data<T>(&self, query: &Query<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.lock();
        let entry = entries.get(query.key())?;
        let value = entry.value.downcast_ref::<T>().cloned();
        if value.is_none() {
            tracing::warn!(key = %query.key(), "cached value has unexpected type");
        }
        value
    }

    /// Replace the cached value and mark it fresh.
    pub fn set_query_data<T>(&self, query: &Query<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.lock()
            .insert(query.key().clone(), Entry::fresh(Arc::new(value)));
        self.notify();
    }

    /// Typed read-modify-write. Does nothing and returns `false` when the entry
    /// is absent.
    pub fn update_query_data<T, F>(&self, query: &Query<T>, update: F) -> bool
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(query.key()) else {
                return false;
            };
            let Some(current) = entry.value.downcast_ref::<T>() else {
                tracing::warn!(key = %query.key(), "cached value has unexpected type");
                return false;
            };
            let mut next = current.clone();
            update(&mut next);
            *entry = Entry::fresh(Arc::new(next));
        }
        self.notify();
        true
    }

    /// Capture the entry so it can be restored exactly after a failed
    /// optimistic write.
    #[must_use]
    pub fn snapshot<T>(&self, query: &Query<T>) -> Snapshot<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.lock();
        let entry = entries.get(query.key());
        Snapshot {
            query: query.clone(),
            value: entry.and_then(|e| e.value.downcast_ref::<T>().cloned()),
            updated_at: entry.map(|e| e.updated_at),
            invalidated: entry.is_some_and(|e| e.invalidated),
        }
    }

    /// Put a snapshot back. An empty snapshot removes the entry.
    pub fn restore<T>(&self, snapshot: Snapshot<T>)
    where
        T: Send + Sync + 'static,
    {
        let Snapshot { query, value, updated_at, invalidated } = snapshot;
        {
            let mut entries = self.lock();
            match value {
                Some(value) => {
                    let entry = Entry {
                        value: Arc::new(value),
                        updated_at: updated_at.unwrap_or_else(Instant::now),
                        invalidated,
                    };
                    entries.insert(query.key().clone(), entry);
                }
                None => {
                    entries.remove(query.key());
                }
            }
        }
        self.notify();
    }

    /// Mark matching entries stale so the next fetch goes to the server.
    pub fn invalidate(&self, key: &QueryKey, mode: KeyMatch) -> usize {
        let count = {
            let mut entries = self.lock();
            let mut count = 0_usize;
            for (_, entry) in entries.iter_mut().filter(|(k, _)| k.matches(key, mode)) {
                entry.invalidated = true;
                count += 1;
            }
            count
        };
        tracing::debug!(%key, ?mode, count, "invalidated queries");
        if count > 0 {
            self.notify();
        }
        count
    }

    /// Drop matching entries entirely.
    pub fn remove(&self, key: &QueryKey, mode: KeyMatch) -> usize {
        let count = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|k, _| !k.matches(key, mode));
            before - entries.len()
        };
        tracing::debug!(%key, ?mode, count, "removed queries");
        if count > 0 {
            self.notify();
        }
        count
    }

    /// Drop everything and fence off in-flight fetches.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let count = {
            let mut entries = self.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        tracing::debug!(count, "query cache cleared");
        self.notify();
    }

    /// Absent entries are stale.
    #[must_use]
    pub fn is_stale(&self, key: &QueryKey, stale_time: Duration) -> bool {
        self.lock()
            .get(key)
            .is_none_or(|entry| entry.is_stale(stale_time, Instant::now()))
    }

    fn fresh_value<T>(&self, query: &Query<T>, stale_time: Duration) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.lock();
        let entry = entries.get(query.key())?;
        if entry.is_stale(stale_time, Instant::now()) {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Serve a fresh cached value, or run `fetch` (retrying retryable errors)
    /// and cache its result.
    ///
    /// # Errors
    ///
    /// Returns the last fetch error once retries are exhausted or the error
    /// is not retryable.
    pub async fn fetch_query<T, F, Fut>(&self, query: &Query<T>, options: &QueryOptions, fetch: F) -> Result<T, ApiError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(value) = self.fresh_value(query, options.stale_time) {
            tracing::debug!(key = %query.key(), "query cache hit");
            return Ok(value);
        }

        tracing::debug!(key = %query.key(), "query cache miss");
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut attempt = 0_u32;
        let value = loop {
            match fetch().await {
                Ok(value) => break value,
                Err(err) if err.retryable() && attempt < options.retry => {
                    let delay = retry_backoff(options.retry_delay, attempt);
                    tracing::debug!(key = %query.key(), attempt, ?delay, error = %err, "retrying query");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.set_query_data(query, value.clone());
        } else {
            tracing::debug!(key = %query.key(), "cache cleared during fetch, result not stored");
        }
        Ok(value)
    }
}
