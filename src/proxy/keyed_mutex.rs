//! Keyed mutex (C3): per-string mutual exclusion to collapse concurrent
//! cache misses for the same slice key into a single upstream fetch.
//!
//! Grounded on `github.com/zijiren233/ksync`'s `DefaultKmutex()` usage in
//! `synctv`'s `server/handlers/proxy/slice.go` (`mu.Lock(cacheKey)` /
//! `mu.Unlock(cacheKey)`), reimplemented as a sharded map of
//! `{ mutex, refcount }`, incrementing on lock and garbage-collecting the
//! entry when the last holder releases it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Entry {
    mutex: Arc<Mutex<()>>,
    refcount: usize,
}

/// A map from string key to a mutex, entries created on demand and garbage
/// collected once unreferenced.
pub struct KeyedMutex {
    entries: DashMap<String, Entry>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`. The returned guard releases the lock and,
    /// if this was the last holder, removes the entry when dropped.
    pub async fn lock(&self, key: &str) -> KeyedMutexGuard<'_> {
        let mutex = {
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
                mutex: Arc::new(Mutex::new(())),
                refcount: 0,
            });
            entry.refcount += 1;
            entry.mutex.clone()
        };

        let guard = mutex.lock_owned().await;
        KeyedMutexGuard {
            table: self,
            key: key.to_string(),
            _guard: guard,
        }
    }

    fn release(&self, key: &str) {
        if let dashmap::mapref::entry::Entry::Occupied(mut occupied) =
            self.entries.entry(key.to_string())
        {
            let entry = occupied.get_mut();
            entry.refcount -= 1;
            if entry.refcount == 0 {
                occupied.remove();
            }
        }
    }
}

impl Default for KeyedMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a single held key. Dropping it releases the lock.
pub struct KeyedMutexGuard<'a> {
    table: &'a KeyedMutex,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyedMutexGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let table = Arc::new(KeyedMutex::new());
        let g1 = table.lock("a").await;
        let g2 = table.lock("b").await;
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn same_key_serializes_concurrent_holders() {
        let table = Arc::new(KeyedMutex::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _guard = table.lock("shared").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_is_collected_after_release() {
        let table = KeyedMutex::new();
        {
            let _guard = table.lock("gone").await;
        }
        assert!(table.entries.is_empty());
    }
}
