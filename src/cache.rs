use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Keyed values that expire `ttl` after they were computed.
///
/// The lock is not held while a producer runs, so two callers racing on the
/// same missing key may both compute; the later insert wins.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((expires, value)) if Instant::now() < *expires => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, ttl: Duration, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, (Instant::now() + ttl, value));
        }
    }

    pub fn get_or_compute<F>(&self, key: K, ttl: Duration, producer: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = producer();
        self.insert(key, ttl, value.clone());
        value
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but errors are returned
    /// and not cached.
    pub fn get_or_try_compute<F, E>(&self, key: K, ttl: Duration, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = producer()?;
        self.insert(key, ttl, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn computes_once_within_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value = cache.get_or_compute("k".to_string(), Duration::from_secs(60), || {
                calls.set(calls.get() + 1);
                7
            });
            assert_eq!(value, 7);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        let calls = Cell::new(0);
        for _ in 0..2 {
            cache.get_or_compute("k", Duration::ZERO, || {
                calls.set(calls.get() + 1);
                1
            });
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new();
        let first: Result<u32, &str> =
            cache.get_or_try_compute("k", Duration::from_secs(60), || Err("down"));
        assert!(first.is_err());
        assert!(cache.is_empty());
        let second: Result<u32, &str> =
            cache.get_or_try_compute("k", Duration::from_secs(60), || Ok(3));
        assert_eq!(second, Ok(3));
        assert_eq!(cache.len(), 1);
    }
}
