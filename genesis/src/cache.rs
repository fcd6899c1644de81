//! Time-to-live cache in front of component mapping lookups.

use crate::config::CacheConfig;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Entries in recency order, least recently used first.
struct CacheState<V> {
    entries: IndexMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    /// Percent of lookups served from the cache
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub max_entries: usize,
}

/// Bounded LRU cache with per-entry TTL. Expiry is checked lazily on `get`
/// and before every insert. All operations take one internal lock.
pub struct ComponentMappingCache<V> {
    state: Mutex<CacheState<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> ComponentMappingCache<V> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: IndexMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.default_ttl())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        // A panic while holding the lock cannot leave an entry half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock();
        Self::get_locked(&mut state, key)
    }

    fn get_locked(state: &mut CacheState<V>, key: &str) -> Option<V> {
        let Some(index) = state.entries.get_index_of(key) else {
            state.misses += 1;
            return None;
        };
        if state.entries[index].is_expired() {
            state.entries.shift_remove_index(index);
            state.expirations += 1;
            state.misses += 1;
            tracing::trace!(key, "cache entry expired");
            return None;
        }
        state.hits += 1;
        // Most recently used lives at the back
        let last = state.entries.len() - 1;
        state.entries.move_index(index, last);
        Some(state.entries[last].value.clone())
    }

    /// Insert with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut state = self.lock();
        self.insert_locked(&mut state, key.into(), value, ttl);
    }

    fn insert_locked(&self, state: &mut CacheState<V>, key: String, value: V, ttl: Duration) {
        state.entries.shift_remove(&key);
        Self::purge_locked(state);
        while state.entries.len() >= self.max_entries {
            if state.entries.shift_remove_index(0).is_none() {
                break;
            }
            state.evictions += 1;
        }
        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value or compute, insert and return it, all under
    /// one lock acquisition. Errors from `f` are returned and nothing is cached.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, ttl: Option<Duration>, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let mut state = self.lock();
        if let Some(value) = Self::get_locked(&mut state, key) {
            return Ok(value);
        }
        let value = f()?;
        self.insert_locked(
            &mut state,
            key.to_string(),
            value.clone(),
            ttl.unwrap_or(self.default_ttl),
        );
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.shift_remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.lock();
        Self::purge_locked(&mut state)
    }

    fn purge_locked(state: &mut CacheState<V>) -> usize {
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - state.entries.len();
        state.expirations += removed as u64;
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            evictions: state.evictions,
            expirations: state.expirations,
            max_entries: self.max_entries,
        }
    }
}

impl<V: Clone> Default for ComponentMappingCache<V> {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ComponentMappingCache::new(10, Duration::from_secs(300));
        cache.set_with_ttl("k", 1, Duration::from_millis(100));
        assert_eq!(cache.get("k"), Some(1));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ComponentMappingCache::new(3, Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("d", 4);
        cache.set("e", 5);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn hits_move_entries_to_the_back() {
        let cache = ComponentMappingCache::new(4, Duration::from_secs(60));
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.set(key, i);
        }
        assert_eq!(cache.get("b"), Some(1));
        assert_eq!(cache.get("d"), Some(3));
        assert_eq!(cache.get("b"), Some(1));
        let order: Vec<String> = cache.lock().entries.keys().cloned().collect();
        assert_eq!(order, vec!["a", "c", "d", "b"]);

        cache.set("e", 4);
        cache.set("f", 5);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.get("b"), Some(1));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn get_or_try_insert_with_caches_successes_only() {
        let cache: ComponentMappingCache<String> = ComponentMappingCache::default();
        let failed: Result<String, &str> = cache.get_or_try_insert_with("x", None, || Err("nope"));
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let value: Result<String, &str> =
            cache.get_or_try_insert_with("x", None, || Ok("computed".to_string()));
        assert_eq!(value.unwrap(), "computed");
        let again: Result<String, &str> =
            cache.get_or_try_insert_with("x", None, || panic!("should be cached"));
        assert_eq!(again.unwrap(), "computed");
        assert!(cache.invalidate("x"));
        assert!(!cache.invalidate("x"));
    }

    #[test]
    fn concurrent_access_is_consistent() {
        let cache = Arc::new(ComponentMappingCache::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}", (t * 100 + i) % 80);
                        if cache.get(&key).is_none() {
                            cache.set(key, i);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert!(stats.entries <= 50);
        assert_eq!(stats.hits + stats.misses, 800);
    }
}
