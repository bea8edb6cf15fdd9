//! Slice cache (C4): associative store from slice-key to (metadata, bytes).
//!
//! The `SliceCache` trait is the pluggable seam callers plug a backend into;
//! eviction policy is opaque to the core. The default in-memory backend uses
//! `lru`, the same crate the teacher's dependency stack already carries for
//! its own bounded caches.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::errors::AppResult;

/// `(resource_key, aligned_offset, slice_size)` hashed to a fixed-width hex
/// digest, used as the cache entry's key.
pub fn slice_key(resource_key: &str, aligned_offset: i64, slice_size: u64) -> String {
    let raw = format!("{resource_key}-{aligned_offset}-{slice_size}");
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Upstream response headers and resource metadata captured at the moment
/// the first slice of a resource was fetched.
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub headers: HashMap<String, Vec<String>>,
    /// `-1` if unknown.
    pub content_total_length: i64,
    pub content_type: String,
}

/// One cached slice: the metadata it was fetched with, plus its bytes.
/// `data.len() <= slice_size`; a short tail signals the last slice of the
/// resource.
#[derive(Debug, Clone)]
pub struct CacheItem {
    pub metadata: CacheMetadata,
    pub data: Bytes,
}

/// Pluggable cache backend. Implementations must be safe under concurrent
/// access; the core relies on the keyed mutex (C3), not the cache, for
/// single-flight.
#[async_trait]
pub trait SliceCache: Send + Sync {
    /// `Ok(None)` on a cache miss — a miss is not an error.
    async fn get(&self, key: &str) -> AppResult<Option<CacheItem>>;

    async fn set(&self, key: &str, item: CacheItem) -> AppResult<()>;
}

/// Default in-memory slice cache, bounded by entry count via an `lru`
/// eviction policy.
pub struct InMemorySliceCache {
    inner: Mutex<LruCache<String, CacheItem>>,
}

impl InMemorySliceCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl SliceCache for InMemorySliceCache {
    async fn get(&self, key: &str) -> AppResult<Option<CacheItem>> {
        let mut cache = self.inner.lock().expect("slice cache mutex poisoned");
        Ok(cache.get(key).cloned())
    }

    async fn set(&self, key: &str, item: CacheItem) -> AppResult<()> {
        let mut cache = self.inner.lock().expect("slice cache mutex poisoned");
        cache.put(key.to_string(), item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(bytes: &[u8]) -> CacheItem {
        CacheItem {
            metadata: CacheMetadata {
                headers: HashMap::new(),
                content_total_length: 100,
                content_type: "video/mp2t".to_string(),
            },
            data: Bytes::copy_from_slice(bytes),
        }
    }

    #[test]
    fn slice_key_is_deterministic_and_distinguishes_inputs() {
        let k1 = slice_key("movie-1", 0, 1024);
        let k2 = slice_key("movie-1", 0, 1024);
        let k3 = slice_key("movie-1", 1024, 1024);
        let k4 = slice_key("movie-2", 0, 1024);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
        assert_eq!(k1.len(), 64);
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = InMemorySliceCache::new(8);
        let key = slice_key("movie-1", 0, 1024);
        assert!(cache.get(&key).await.unwrap().is_none());
        cache.set(&key, item(b"hello")).await.unwrap();
        let hit = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(&hit.data[..], b"hello");
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let cache = InMemorySliceCache::new(1);
        let k1 = slice_key("m", 0, 1024);
        let k2 = slice_key("m", 1024, 1024);
        cache.set(&k1, item(b"a")).await.unwrap();
        cache.set(&k2, item(b"b")).await.unwrap();
        assert!(cache.get(&k1).await.unwrap().is_none());
        assert!(cache.get(&k2).await.unwrap().is_some());
    }
}
