//! Cache Statistics Module
//!
//! Tracks per-region counters and builds point-in-time statistics snapshots.

use serde::Serialize;

use crate::tasks::ShrinkerRunStats;

// == Cache Stats ==
/// Counters maintained by a memory store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of touching lookups that found an element
    pub hits: u64,
    /// Number of touching lookups that found nothing
    pub misses: u64,
    /// Number of elements pushed out by the capacity bound
    pub evictions: u64,
    /// Number of elements handed to the secondary store
    pub spooled: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_spool(&mut self) {
        self.spooled += 1;
    }
}

// == Store Statistics ==
/// Snapshot returned by `MemoryStore::statistics`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatistics {
    /// Store type, derived from the eviction policy
    pub type_name: String,
    pub region: String,
    /// Number of live elements
    pub size: usize,
    pub counters: CacheStats,
    /// Result of the most recent shrinker run, if any
    pub last_shrink: Option<ShrinkerRunStats>,
}
