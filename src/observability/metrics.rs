//! Engine counters
//!
//! - Counters only, monotonic
//! - Reset only when the owning dataframe is created
//! - Relaxed atomics; a snapshot is not a consistent cut

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct EngineMetrics {
    plans_built: AtomicU64,
    plans_rejected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    executions: AtomicU64,
    rows_returned: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_plans_built(&self) {
        self.plans_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_rejected(&self) {
        self.plans_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one finished execution and the rows it produced.
    pub fn record_execution(&self, rows: u64) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.rows_returned.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_built: self.plans_built.load(Ordering::Relaxed),
            plans_rejected: self.plans_rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub plans_built: u64,
    pub plans_rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub executions: u64,
    pub rows_returned: u64,
}
