//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh reads served by either tier.
    pub hits: u64,
    pub misses: u64,
    /// Expired values served after a failed fetch.
    pub stale_serves: u64,
    /// Entries pushed out of the memory tier by its entry cap.
    pub memory_evictions: u64,
    /// Persistent entries deleted to make room after a quota failure.
    pub quota_evictions: u64,
    /// Writes that only reached the memory tier.
    pub degraded_writes: u64,
    /// Corrupt persisted entries removed.
    pub corrupt_removed: u64,
    pub memory_entries: u64,
    pub persistent_entries: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub stale_serves: AtomicU64,
    pub memory_evictions: AtomicU64,
    pub quota_evictions: AtomicU64,
    pub degraded_writes: AtomicU64,
    pub corrupt_removed: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, memory_entries: u64, persistent_entries: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
            quota_evictions: self.quota_evictions.load(Ordering::Relaxed),
            degraded_writes: self.degraded_writes.load(Ordering::Relaxed),
            corrupt_removed: self.corrupt_removed.load(Ordering::Relaxed),
            memory_entries,
            persistent_entries,
        }
    }
}
