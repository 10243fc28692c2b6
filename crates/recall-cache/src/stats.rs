use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of a [`crate::SemanticCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub ttl_evictions: u64,
    pub lru_evictions: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.exact_hits + self.semantic_hits + self.misses
    }

    /// Fraction of lookups answered from the cache; 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            return 0.0;
        }
        (self.exact_hits + self.semantic_hits) as f64 / total as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) exact_hits: AtomicU64,
    pub(crate) semantic_hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) ttl_evictions: AtomicU64,
    pub(crate) lru_evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, capacity: usize) -> CacheStats {
        CacheStats {
            entries,
            capacity,
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_evictions: self.ttl_evictions.load(Ordering::Relaxed),
            lru_evictions: self.lru_evictions.load(Ordering::Relaxed),
        }
    }
}
