//! Per-object annotation cache using moka
//!
//! A read-through mirror of the last known-good record for each object id.
//! The host metadata store stays authoritative; the cache only saves round
//! trips. Entries live for the lifetime of the engine: the cache is built
//! without a capacity bound or TTL, so nothing is ever evicted.

use crate::record::AnnotationRecord;
use annotate_host::ObjectId;
use moka::future::Cache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache (approximate)
    pub entry_count: u64,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the host
    pub misses: u64,
}

/// Object-id keyed record cache
#[derive(Debug, Clone)]
pub struct ObjectCache {
    inner: Cache<ObjectId, AnnotationRecord>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ObjectCache {
    /// Create unbounded cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Store the last known-good record for an object
    #[inline]
    pub async fn put(&self, id: ObjectId, record: AnnotationRecord) {
        self.inner.insert(id, record).await;
    }

    /// Get cached record
    #[must_use]
    pub async fn get(&self, id: &ObjectId) -> Option<AnnotationRecord> {
        let found = self.inner.get(id).await;
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Get cached record, or fetch and cache it
    ///
    /// The cache is only populated when `fetch` succeeds.
    pub async fn get_or_try_fetch<E, F, Fut>(&self, id: &ObjectId, fetch: F) -> Result<AnnotationRecord, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnnotationRecord, E>>,
    {
        // Check cache first
        if let Some(cached) = self.get(id).await {
            return Ok(cached);
        }

        let record = fetch().await?;
        self.put(id.clone(), record.clone()).await;
        Ok(record)
    }

    /// Invalidate cache entry
    #[inline]
    pub async fn invalidate(&self, id: &ObjectId) {
        self.inner.invalidate(id).await;
    }

    /// Check if cache holds an entry without touching the counters
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.inner.contains_key(id)
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn record(content: &str) -> AnnotationRecord {
        AnnotationRecord::text("1.0.0", content)
    }

    #[tokio::test]
    async fn cache_put_and_get() {
        let cache = ObjectCache::new();
        let id = ObjectId::new("o-1");

        cache.put(id.clone(), record("hello")).await;

        let retrieved = cache.get(&id).await.unwrap();
        assert_eq!(retrieved.content(), Some("hello"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn cache_returns_none_for_missing() {
        let cache = ObjectCache::new();
        assert!(cache.get(&ObjectId::new("missing")).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn fetch_runs_once() {
        let cache = ObjectCache::new();
        let id = ObjectId::new("o-1");
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let first: Result<_, ()> = cache
            .get_or_try_fetch(&id, || async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(record("fetched"))
            })
            .await;
        assert_eq!(first.unwrap().content(), Some("fetched"));

        // Second call should use cache
        let second: Result<_, ()> = cache
            .get_or_try_fetch(&id, || async {
                unreachable!("should use cached value")
            })
            .await;
        assert_eq!(second.unwrap().content(), Some("fetched"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache = ObjectCache::new();
        let id = ObjectId::new("o-1");

        let result: Result<AnnotationRecord, &str> =
            cache.get_or_try_fetch(&id, || async { Err("offline") }).await;
        assert_eq!(result.unwrap_err(), "offline");
        assert!(!cache.contains(&id));
    }

    #[tokio::test]
    async fn cache_invalidation() {
        let cache = ObjectCache::new();
        let id = ObjectId::new("o-1");

        cache.put(id.clone(), record("x")).await;
        assert!(cache.contains(&id));

        cache.invalidate(&id).await;
        assert!(!cache.contains(&id));
    }
}
