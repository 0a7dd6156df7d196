use std::collections::BTreeMap;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Session-lifetime snapshot cache.
///
/// Entries are never evicted; keys live in a `BTreeMap` so traversal order
/// is stable. Inserting an existing key replaces the value.
#[derive(Debug)]
pub struct SnapshotCache<K, V> {
    entries: BTreeMap<K, V>,
    stats: CacheStats,
}

impl<K: Ord, V> Default for SnapshotCache<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }
}

impl<K: Ord, V> SnapshotCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`, counting the hit or miss.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let found = self.entries.get(key);
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheStats, SnapshotCache};

    #[test]
    fn counts_hits_and_misses() {
        let mut c = SnapshotCache::new();
        assert!(c.get(&1914).is_none());
        c.insert(1914, "snapshot");
        assert_eq!(c.get(&1914), Some(&"snapshot"));
        assert_eq!(c.stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(c.peek(&1914), Some(&"snapshot"));
        assert_eq!(c.stats().hits, 1);
    }

    #[test]
    fn keys_are_ordered() {
        let mut c = SnapshotCache::new();
        c.insert(1945, ());
        c.insert(-500, ());
        c.insert(1492, ());
        assert_eq!(c.keys().copied().collect::<Vec<_>>(), vec![-500, 1492, 1945]);
    }
}
