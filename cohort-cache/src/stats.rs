//! Loader statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of loader activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a fresh entry.
    pub hits: u64,
    /// Reads that started a backend call.
    pub misses: u64,
    /// Reads that attached to an in-flight call.
    pub coalesced: u64,
    /// Backend calls that failed.
    pub failures: u64,
    /// Entries removed by `invalidate`, `invalidate_prefix` or `clear`.
    pub invalidations: u64,
    /// Entries currently stored (fresh or not yet swept).
    pub entry_count: u64,
    /// Calls currently outstanding.
    pub in_flight: u64,
}

impl CacheStats {
    /// Fraction of reads that needed no backend call of their own (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.coalesced;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub failures: AtomicU64,
    pub invalidations: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize, in_flight: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
            in_flight: in_flight as u64,
        }
    }
}
