//! Capacity-bounded LRU cache.

use super::stats::{AtomicStats, CacheStats};
use crate::{Error, ErrorContext, Result};
use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => panic!("default cache capacity must be non-zero"),
};

/// In-memory key/value store with least-recently-used eviction.
///
/// All methods take `&self`; one instance is meant to be shared behind an
/// `Arc` by every component that needs the same capacity budget.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
    stats: AtomicStats,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(max_size).ok_or_else(|| {
            Error::configuration_with_context(
                "cache capacity must be greater than zero",
                ErrorContext::new()
                    .with_field_path("cache.max_size")
                    .with_source("bounded_cache"),
            )
        })?;
        Ok(Self::with_capacity(cap))
    }

    pub fn with_capacity(max_size: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_size)),
            stats: AtomicStats::new(),
        }
    }

    /// Insert or refresh `key`, returning the entry evicted to make room, if any.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let mut entries = self.lock();
        let evicted = if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            entries.pop_lru()
        } else {
            None
        };
        entries.put(key, value);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Look up `key` and mark it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hit = self.lock().get(key).cloned();
        let counter = if hit.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Look up `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().peek(key).cloned()
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().contains(key)
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.lock().pop(key).is_some();
        if removed {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, V>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K: Hash + Eq, V: Clone> Default for BoundedCache<K, V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_refreshes_recency() {
        let cache: BoundedCache<String, i32> = BoundedCache::new(2).unwrap();
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.get("a"), Some(1));

        let evicted = cache.set("c".into(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(!cache.has("b"));
        assert!(cache.has("a"));
        assert!(cache.has("c"));
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn test_set_existing_key_refreshes_without_eviction() {
        let cache: BoundedCache<String, i32> = BoundedCache::new(2).unwrap();
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert_eq!(cache.set("a".into(), 10), None);
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);

        cache.set("c".into(), 3);
        assert!(!cache.has("b"));
        assert_eq!(cache.get("a"), Some(10));
    }

    #[test]
    fn test_miss_does_not_reorder() {
        let cache: BoundedCache<&'static str, i32> = BoundedCache::new(2).unwrap();
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("zzz"), None);
        assert_eq!(cache.peek("a"), Some(1));
        cache.set("c", 3);
        // peek and the miss left "a" as least recent
        assert!(!cache.has("a"));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache: BoundedCache<String, String> = BoundedCache::default();
        assert_eq!(cache.capacity(), 100);
        cache.set("k".into(), "v".into());
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        cache.set("x".into(), "y".into());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(3).unwrap();
        for i in 0..50 {
            cache.set(i, i * 2);
            assert!(cache.size() <= 3);
        }
        assert_eq!(cache.keys(), vec![49, 48, 47]);
        assert_eq!(cache.stats().evictions, 47);
    }

    #[test]
    fn test_stats() {
        let cache: BoundedCache<String, u8> = BoundedCache::new(4).unwrap();
        cache.set("a".into(), 1);
        cache.get("a");
        cache.get("a");
        cache.get("b");
        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BoundedCache::<String, u8>::new(0).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
