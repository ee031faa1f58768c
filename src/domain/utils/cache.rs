use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_access: u64,
}

/// Bounded key/value cache with least-recently-used eviction and an optional
/// time-to-live. Callers wrap it in a lock; it does no synchronisation itself.
///
/// A `capacity` of 0 means unbounded, a `ttl` of `None` means entries never expire.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        TtlCache { entries: HashMap::new(), capacity, ttl, clock: 0 }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        if self.is_expired(key) {
            self.entries.remove(key);
            return None;
        }

        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_access = clock;
            entry.value.clone()
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity > 0 && !self.entries.contains_key(&key) {
            self.evict_expired();
            while self.entries.len() >= self.capacity {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }

        self.clock += 1;
        self.entries.insert(key, CacheEntry { value, inserted_at: Instant::now(), last_access: self.clock });
    }

    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drops every entry whose key matches, returning how many were removed.
    pub fn invalidate_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, key: &K) -> bool {
        match (self.ttl, self.entries.get(key)) {
            (Some(ttl), Some(entry)) => entry.inserted_at.elapsed() >= ttl,
            _ => false,
        }
    }

    fn evict_expired(&mut self) {
        if let Some(ttl) = self.ttl {
            self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        }
    }

    fn evict_least_recent(&mut self) -> bool {
        let oldest = self.entries.iter().min_by_key(|(_, entry)| entry.last_access).map(|(key, _)| key.clone());

        match oldest {
            Some(key) => {
                log::debug!("Cache at capacity {}, evicting least recently used entry.", self.capacity);
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_entry() {
        let mut cache: TtlCache<&str, i32> = TtlCache::new(2, None);
        cache.insert("a", 1);
        cache.insert("b", 2);

        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let mut cache: TtlCache<String, i32> = TtlCache::new(0, Some(Duration::from_millis(0)));
        cache.insert("k".to_string(), 7);

        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_where_removes_matching_keys() {
        let mut cache: TtlCache<(String, u8), i32> = TtlCache::new(0, None);
        cache.insert(("pipe:1-a".to_string(), 0), 1);
        cache.insert(("pipe:1-a".to_string(), 1), 2);
        cache.insert(("other:1-a".to_string(), 0), 3);

        let removed = cache.invalidate_where(|(uri, _)| uri == "pipe:1-a");

        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate(&("other:1-a".to_string(), 0)), Some(3));
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let mut cache: TtlCache<&str, i32> = TtlCache::new(1, None);
        cache.insert("a", 1);
        cache.insert("a", 2);

        assert_eq!(cache.get(&"a"), Some(2));
    }
}
