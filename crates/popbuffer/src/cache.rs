//! Response cache for fetched chunks.
//!
//! Entries are keyed by [`chunk_key`], which combines the resource URL with
//! the requested byte range, so a whole-resource fetch and a ranged fetch of
//! the same file never alias.
//!
//! # Implementations
//!
//! - [`MemoryCache`]: In-memory cache with an optional byte budget
//! - [`NoCache`]: Passthrough implementation that caches nothing

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::error::Result;
use crate::range::ByteRange;

/// Future type for cache lookups.
pub type GetFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;

/// Future type for cache writes.
pub type CacheFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Build the cache key for a chunk request.
#[must_use]
pub fn chunk_key(url: &str, range: ByteRange) -> String {
    format!("{url}#{range}")
}

/// A cache for storing fetched chunks.
pub trait Cache: Send + Sync {
    /// Look up a chunk. `Ok(None)` means not cached.
    fn get(&self, key: &str) -> GetFuture<'_>;

    /// Store a chunk under `key`.
    fn put(&self, key: &str, data: Vec<u8>) -> CacheFuture<'_>;

    /// Remove a chunk.
    fn remove(&self, key: &str) -> CacheFuture<'_>;

    /// Drop every cached chunk.
    fn clear(&self) -> CacheFuture<'_>;
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> GetFuture<'_> {
        Box::pin(async { Ok(None) })
    }

    fn put(&self, _key: &str, _data: Vec<u8>) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, _key: &str) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// An in-memory chunk cache.
///
/// With a byte budget, the oldest inserted chunks are evicted first. A chunk
/// larger than the whole budget is not stored at all.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<MemoryCacheInner>>,
    max_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Vec<u8>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    bytes: usize,
    hits: u64,
    misses: u64,
}

impl MemoryCacheInner {
    fn evict(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.bytes -= old.len();
            self.order.retain(|k| k != key);
        }
    }
}

/// Hit/miss counters of a [`MemoryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

impl MemoryCache {
    /// Create an unbounded memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory cache holding at most `max_bytes` of chunk data.
    #[must_use]
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_bytes: Some(max_bytes),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.read();
        CacheStats {
            entries: inner.entries.len(),
            bytes: inner.bytes,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Number of cached chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryCacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryCacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> GetFuture<'_> {
        let mut inner = self.write();
        let result = inner.entries.get(key).cloned();
        if result.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        Box::pin(async move { Ok(result) })
    }

    fn put(&self, key: &str, data: Vec<u8>) -> CacheFuture<'_> {
        let mut inner = self.write();
        inner.evict(key);

        let fits = self.max_bytes.is_none_or(|max| data.len() <= max);
        if fits {
            if let Some(max) = self.max_bytes {
                while inner.bytes + data.len() > max {
                    let Some(oldest) = inner.order.pop_front() else {
                        break;
                    };
                    if let Some(old) = inner.entries.remove(&oldest) {
                        inner.bytes -= old.len();
                    }
                }
            }
            inner.bytes += data.len();
            inner.order.push_back(key.to_string());
            inner.entries.insert(key.to_string(), data);
        } else {
            tracing::debug!(key, len = data.len(), "chunk exceeds cache budget");
        }

        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> CacheFuture<'_> {
        self.write().evict(key);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        let mut inner = self.write();
        inner.entries.clear();
        inner.order.clear();
        inner.bytes = 0;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn test_chunk_key_distinguishes_ranges() {
        let url = "http://localhost/bunny.pop";
        let full = chunk_key(url, ByteRange::Full);
        let span = chunk_key(url, ByteRange::Span { begin: 0, end: 239 });
        assert_ne!(full, span);
        assert_eq!(span, "http://localhost/bunny.pop#0-239");
    }

    #[test]
    fn test_no_cache() {
        let cache = NoCache;
        block_on(cache.put("a", vec![1, 2, 3])).unwrap();
        assert!(block_on(cache.get("a")).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache_hit_and_miss() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        assert!(block_on(cache.get("a")).unwrap().is_none());

        block_on(cache.put("a", vec![1, 2, 3])).unwrap();
        assert_eq!(block_on(cache.get("a")).unwrap(), Some(vec![1, 2, 3]));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_memory_cache_evicts_oldest() {
        let cache = MemoryCache::with_max_bytes(10);
        block_on(cache.put("level-1", vec![0; 5])).unwrap();
        block_on(cache.put("level-2", vec![0; 5])).unwrap();
        block_on(cache.put("level-3", vec![0; 3])).unwrap();

        assert!(block_on(cache.get("level-1")).unwrap().is_none());
        assert!(block_on(cache.get("level-2")).unwrap().is_some());
        assert!(block_on(cache.get("level-3")).unwrap().is_some());
        assert_eq!(cache.stats().bytes, 8);
    }

    #[test]
    fn test_memory_cache_skips_oversized_chunk() {
        let cache = MemoryCache::with_max_bytes(4);
        block_on(cache.put("small", vec![0; 4])).unwrap();
        block_on(cache.put("huge", vec![0; 5])).unwrap();
        assert!(block_on(cache.get("small")).unwrap().is_some());
        assert!(block_on(cache.get("huge")).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache_replace_and_clear() {
        let cache = MemoryCache::new();
        block_on(cache.put("a", vec![1])).unwrap();
        block_on(cache.put("a", vec![1, 2])).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().bytes, 2);

        block_on(cache.put("b", vec![3])).unwrap();
        block_on(cache.remove("a")).unwrap();
        assert_eq!(cache.len(), 1);

        block_on(cache.clear()).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().bytes, 0);
    }

    #[test]
    fn test_memory_cache_clones_share_storage() {
        let cache = MemoryCache::new();
        let other = cache.clone();
        block_on(cache.put("a", vec![9])).unwrap();
        assert_eq!(block_on(other.get("a")).unwrap(), Some(vec![9]));
    }
}
