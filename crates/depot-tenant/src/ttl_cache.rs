use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A small time-expiring map. Unlike an LRU/SIEVE cache, capacity is
/// unbounded — entries are invalidated by age, not by eviction pressure,
/// which matches a registry of tenants (expected to number in the
/// thousands at most) rather than an item cache.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|(value, inserted_at)| {
            if inserted_at.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_past_ttl() {
        let mut cache = TtlCache::new(Duration::from_millis(10));
        cache.insert("t1", 1);
        assert_eq!(cache.get(&"t1"), Some(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"t1"), None);
    }

    #[test]
    fn invalidate_removes_entry_immediately() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("t1", 1);
        cache.invalidate(&"t1");
        assert_eq!(cache.get(&"t1"), None);
    }
}
