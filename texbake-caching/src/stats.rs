//! Hit/miss counters shared by the bake result store and the image hash cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a cache's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Entries dropped by an explicit clear
    pub cleared: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, 0.0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {}/{} hits ({:.0}%)",
            self.entries,
            self.hits,
            self.lookups,
            self.hit_rate() * 100.0
        )
    }
}

#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    cleared: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.cleared.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_stats(&self, entries: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            lookups: hits + misses,
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
            entries,
        }
    }
}
