//! Result Cache - short-TTL memoization of evidence collection
//!
//! Owned by whoever creates it (normally one `AssessmentEngine` per device
//! session). There is no global instance.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

// ============================================================================
// CONSTANTS
// ============================================================================

const CACHE_MAX_SIZE: usize = 256;

// ============================================================================
// RESULT CACHE
// ============================================================================

struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

pub struct ResultCache<K, V> {
    entries: RwLock<HashMap<K, CachedEntry<V>>>,
    ttl: Duration,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry. Expired entries are treated as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|cached| cached.cached_at.elapsed() < self.ttl)
            .map(|cached| cached.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write();

        if entries.len() >= CACHE_MAX_SIZE && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, cached| cached.cached_at.elapsed() < ttl);

            // Still full: drop the oldest entry
            if entries.len() >= CACHE_MAX_SIZE {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, cached)| cached.cached_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CachedEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cache: ResultCache<String, u32> = ResultCache::new(Duration::from_secs(60));
        cache.set("root".to_string(), 7);
        assert_eq!(cache.get(&"root".to_string()), Some(7));
        assert_eq!(cache.get(&"debug".to_string()), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache: ResultCache<&str, u32> = ResultCache::new(Duration::from_millis(10));
        cache.set("root", 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&"root"), None);
    }

    #[test]
    fn test_clear_and_invalidate() {
        let cache: ResultCache<&str, u32> = ResultCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_evicts_instead_of_growing() {
        let cache: ResultCache<usize, usize> = ResultCache::new(Duration::from_secs(60));
        for i in 0..CACHE_MAX_SIZE + 10 {
            cache.set(i, i);
        }
        assert_eq!(cache.len(), CACHE_MAX_SIZE);
        assert_eq!(cache.get(&(CACHE_MAX_SIZE + 9)), Some(CACHE_MAX_SIZE + 9));
    }

    #[test]
    fn test_separate_caches_do_not_share_state() {
        let first: ResultCache<&str, u32> = ResultCache::new(Duration::from_secs(60));
        let second: ResultCache<&str, u32> = ResultCache::new(Duration::from_secs(60));
        first.set("root", 1);
        assert_eq!(second.get(&"root"), None);
    }
}
