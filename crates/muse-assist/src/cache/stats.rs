//! Cache hit and miss accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters shared by the cache tiers.
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub lookups: AtomicU64,
    pub hot_hits: AtomicU64,
    pub pattern_hits: AtomicU64,
    pub disk_hits: AtomicU64,
    pub insertions: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hot_hits: self.hot_hits.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hot_entries: 0,
            pattern_entries: 0,
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub hot_hits: u64,
    pub pattern_hits: u64,
    pub disk_hits: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub hot_entries: usize,
    pub pattern_entries: usize,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hot_hits + self.pattern_hits + self.disk_hits
    }

    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits() as f64 / self.lookups as f64
        }
    }
}
