//! Series Cache
//!
//! Bounded LRU store for resolved series lookups. Concurrent misses on the
//! same key share one in-flight resolution, so each key costs at most one
//! upstream call no matter how many requests race for it.

use crate::error::DatasourceError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capacity of the cache owned by each connection instance.
pub const SERIES_CACHE_CAPACITY: usize = 1024;

type Resolution<V> = Shared<BoxFuture<'static, Result<Arc<V>, DatasourceError>>>;

struct CacheInner<V> {
    /// Successful resolutions, most recently used first
    entries: Mutex<LruCache<String, Arc<V>>>,
    /// Resolutions currently waiting on the upstream API
    in_flight: DashMap<String, Resolution<V>>,
    /// Set once the owning instance is disposed
    closed: AtomicBool,
    capacity: usize,
}

/// Bounded key → value cache with coalesced misses.
///
/// Hits never await. Failed resolutions are handed to every waiting caller
/// but never stored.
pub struct SeriesCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for SeriesCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> SeriesCache<V>
where
    V: Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self, DatasourceError> {
        let bound = NonZeroUsize::new(capacity).ok_or_else(|| {
            DatasourceError::Construction("series cache capacity must be positive".to_string())
        })?;

        Ok(Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(LruCache::new(bound)),
                in_flight: DashMap::new(),
                closed: AtomicBool::new(false),
                capacity,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is cached, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.lock().contains(key)
    }

    /// Cached value for `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.entries.lock().get(key).cloned()
    }

    /// Number of resolutions currently in flight.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Return the cached value for `key`, or resolve it with `resolver`.
    ///
    /// `resolver` is only invoked when no resolution for `key` is cached or
    /// already in flight. Callers arriving while a resolution is in flight
    /// wait for it and receive its outcome.
    pub async fn resolve<F, Fut>(&self, key: &str, resolver: F) -> Result<Arc<V>, DatasourceError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<V, DatasourceError>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            tracing::debug!("series cache hit: {}", key);
            return Ok(value);
        }

        let resolution = match self.inner.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("joining in-flight lookup: {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A resolution may have finished between the lookup above and
                // taking the entry.
                if let Some(value) = self.inner.entries.lock().get(key).cloned() {
                    return Ok(value);
                }
                tracing::debug!("series cache miss: {}", key);
                let resolution = Self::start(Arc::clone(&self.inner), key.to_string(), resolver);
                entry.insert(resolution.clone());
                resolution
            }
        };

        Waiter {
            inner: &self.inner,
            key,
            resolution: Some(resolution),
        }
        .wait()
        .await
    }

    /// Drop every entry and stop accepting new ones.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.entries.lock().clear();
        self.inner.in_flight.clear();
    }

    fn start<F, Fut>(inner: Arc<CacheInner<V>>, key: String, resolver: F) -> Resolution<V>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<V, DatasourceError>> + Send + 'static,
    {
        let lookup = resolver(key.clone());
        async move {
            let outcome = lookup.await.map(Arc::new);
            match &outcome {
                Ok(value) if !inner.closed.load(Ordering::SeqCst) => {
                    inner.entries.lock().put(key.clone(), Arc::clone(value));
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("series lookup for {} failed: {}", key, e),
            }
            inner.in_flight.remove(&key);
            outcome
        }
        .boxed()
        .shared()
    }
}

/// One caller waiting on an in-flight resolution.
///
/// If the last waiter goes away before the resolution completes, the
/// resolution is dropped with it, which aborts the upstream request.
struct Waiter<'a, V> {
    inner: &'a CacheInner<V>,
    key: &'a str,
    resolution: Option<Resolution<V>>,
}

impl<V> Waiter<'_, V> {
    async fn wait(mut self) -> Result<Arc<V>, DatasourceError> {
        let resolution = self
            .resolution
            .as_mut()
            .ok_or_else(|| DatasourceError::Internal("waiter polled twice".to_string()))?;
        let outcome = resolution.await;
        self.resolution = None;
        outcome
    }
}

impl<V> Drop for Waiter<'_, V> {
    fn drop(&mut self) {
        if let Some(resolution) = self.resolution.take() {
            drop(resolution);
            let abandoned = self
                .inner
                .in_flight
                .remove_if(self.key, |_, pending| pending.strong_count() == Some(1));
            if abandoned.is_some() {
                tracing::debug!("abandoned series lookup: {}", self.key);
            }
        }
    }
}
