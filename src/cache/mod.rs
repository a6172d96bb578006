// src/cache/mod.rs

//! Query cache with stale windows, prefix invalidation and retries.
//!
//! Reads go through [`QueryCache::fetch`] under a [`QueryKey`]. A cached value
//! is served while it is fresh; once stale (or invalidated) the fetcher runs
//! again with the [`RetryPolicy`]. If that still fails with a transient error
//! and an older value is held, the older value is served and the error is
//! logged. Any other failure drops the entry.
//!
//! Mutations invalidate by key prefix so the next read refetches.

mod key;
mod retry;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;
use crate::models::CacheConfig;

pub use key::QueryKey;
pub use retry::RetryPolicy;

/// Per-call cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Age after which a value is refetched
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    updated_at: Instant,
    last_read: Instant,
    invalidated: bool,
}

impl Entry {
    fn new(value: Arc<dyn Any + Send + Sync>) -> Self {
        let now = Instant::now();
        Self {
            value,
            updated_at: now,
            last_read: now,
            invalidated: false,
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated && self.updated_at.elapsed() < stale_time
    }
}

/// In-process cache of query results keyed by [`QueryKey`].
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    defaults: FetchOptions,
    gc_time: Duration,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            defaults: FetchOptions {
                stale_time: config.stale_time(),
                retry: RetryPolicy::from_config(config),
            },
            gc_time: config.gc_time(),
        }
    }

    /// Default options, for callers that only override some fields.
    pub fn options(&self) -> FetchOptions {
        self.defaults
    }

    /// Serve `key` from cache or run `fetcher`.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, options: FetchOptions, fetcher: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let stale = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.last_read = Instant::now();
                    let value = entry.value.downcast_ref::<T>().cloned();
                    match value {
                        Some(value) if entry.is_fresh(options.stale_time) => {
                            log::trace!("cache hit {key}");
                            return Ok(value);
                        }
                        other => other,
                    }
                }
                None => None,
            }
        };

        log::debug!("cache miss {key}");
        match options.retry.run(fetcher).await {
            Ok(value) => {
                self.set(key, value.clone()).await;
                Ok(value)
            }
            Err(e) => match stale {
                Some(value) if e.is_retryable() => {
                    log::warn!("Refetch of {key} failed, serving stale data: {e}");
                    Ok(value)
                }
                Some(_) => {
                    self.entries.write().await.remove(&key);
                    Err(e)
                }
                None => Err(e),
            },
        }
    }

    /// Cached value regardless of age.
    pub async fn get<T: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .and_then(|entry| entry.value.downcast_ref::<T>().cloned())
    }

    /// Store a value known to be current.
    pub async fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let mut entries = self.entries.write().await;
        entries.insert(key, Entry::new(Arc::new(value)));
    }

    /// Mark every entry under `prefix` stale. Returns how many were marked.
    pub async fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write().await;
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("invalidated {count} entries under {prefix}");
        }
        count
    }

    /// Drop every entry under `prefix`. Returns how many were dropped.
    pub async fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop entries not read within the gc window.
    pub async fn gc(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_read.elapsed() < self.gc_time);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
