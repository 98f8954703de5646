//! Cache counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated lock-free from any task
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub memory_hits: AtomicU64,
    pub durable_hits: AtomicU64,
    pub network_loads: AtomicU64,
    pub load_failures: AtomicU64,
    pub joined_loads: AtomicU64,
    pub durable_write_failures: AtomicU64,
    pub invalidations: AtomicU64,
    pub remote_invalidations: AtomicU64,
}

impl CacheCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, memory_entries: usize, in_flight_loads: usize) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            network_loads: self.network_loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            joined_loads: self.joined_loads.load(Ordering::Relaxed),
            durable_write_failures: self.durable_write_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            remote_invalidations: self.remote_invalidations.load(Ordering::Relaxed),
            memory_entries,
            in_flight_loads,
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    /// Successful network fetches
    pub network_loads: u64,
    pub load_failures: u64,
    /// Requests that awaited another caller's load
    pub joined_loads: u64,
    pub durable_write_failures: u64,
    /// Local invalidate/clear calls
    pub invalidations: u64,
    /// Invalidations applied from other instances
    pub remote_invalidations: u64,
    pub memory_entries: usize,
    pub in_flight_loads: usize,
}

impl CacheStats {
    /// Total successful lookups
    pub fn total_requests(&self) -> u64 {
        self.memory_hits + self.durable_hits + self.network_loads + self.joined_loads
    }

    /// Share of lookups served from memory or durable storage (0.0-100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.memory_hits + self.durable_hits + self.network_loads;
        if total == 0 {
            0.0
        } else {
            (self.memory_hits + self.durable_hits) as f64 / total as f64 * 100.0
        }
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} memory hits, {} durable hits, {} network loads ({:.1}% hit rate), {} joined",
            self.memory_hits,
            self.durable_hits,
            self.network_loads,
            self.hit_rate(),
            self.joined_loads
        )
    }
}
