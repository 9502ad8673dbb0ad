//! Bounded cache with per-entry expiry
//!
//! Capacity is enforced LRU-style by `lru::LruCache`; entries older than the
//! configured time-to-live are treated as absent and dropped on access.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// A zero capacity is bumped to one
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, (Instant, V)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, (Instant::now(), value));
    }

    /// Live entry count, expired entries that were not yet accessed included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Errors are not cached. The lock is not held while `fetch` runs, so two
    /// concurrent misses for the same key may both fetch.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        K: Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = TtlCache::new(10, Duration::from_secs(60));
        cache.insert("frieren", 400602u64);
        assert_eq!(cache.get(&"frieren"), Some(400602));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&"frieren"), Some(400602));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"frieren"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, "a");
        cache.insert(2, "b");
        // touch 1 so 2 becomes the eviction candidate
        assert_eq!(cache.get(&1), Some("a"));
        cache.insert(3, "c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache = TtlCache::new(0, Duration::from_secs(1));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[tokio::test]
    async fn test_get_or_try_insert_with_caches_success_only() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, Duration::from_secs(60));

        let failed: Result<u32, &str> = cache.get_or_try_insert_with("k", || async { Err("down") }).await;
        assert!(failed.is_err());
        assert!(cache.get(&"k").is_none());

        let first: Result<u32, &str> = cache.get_or_try_insert_with("k", || async { Ok(7) }).await;
        assert_eq!(first, Ok(7));
        let second: Result<u32, &str> = cache.get_or_try_insert_with("k", || async { Ok(8) }).await;
        assert_eq!(second, Ok(7));
    }
}
