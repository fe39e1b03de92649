//! Statistics tracking for the resolver.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic query counters.
///
/// Each query bumps `total_queries` once and at most one outcome counter,
/// except that a forwarded query with answers also counts as `answered`.
pub struct Stats {
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
    blocks: AtomicU64,
    forwarded: AtomicU64,
    answered: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    server_start_time: DateTime<Utc>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            blocks: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            answered: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            server_start_time: Utc::now(),
        }
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, answered: bool) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        if answered {
            self.answered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_time_us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);

        let avg_response_ms = if total_queries > 0 {
            (total_us as f64 / total_queries as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            total_queries,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            answered: self.answered.load(Ordering::Relaxed),
            avg_response_ms,
            server_start_time: self.server_start_time,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub blocks: u64,
    pub forwarded: u64,
    pub answered: u64,
    pub avg_response_ms: f64,
    pub server_start_time: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.server_start_time).num_seconds()
    }
}
