//! Request counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic request counters; only `reset` moves them backwards
#[derive(Debug, Default)]
pub struct Stats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    cached: AtomicU64,
    deduplicated: AtomicU64,
}

impl Stats {
    pub fn record_dispatch(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hits(&self, hits: u64) {
        self.cached.fetch_add(hits, Ordering::Relaxed);
    }

    pub fn record_dedup(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total,
            &self.success,
            &self.failed,
            &self.retried,
            &self.cached,
            &self.deduplicated,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Operations dispatched to a provider
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Retry attempts, not retried operations
    pub retried: u64,
    /// Answers served from cache
    pub cached: u64,
    /// Callers that joined an identical in-flight request
    pub deduplicated: u64,
}

impl StatsSnapshot {
    /// Share of dispatched operations that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} requests ({} ok, {} failed, {:.1}% success), {} retries, {} cache hits, {} deduplicated",
            self.total,
            self.success,
            self.failed,
            self.success_rate() * 100.0,
            self.retried,
            self.cached,
            self.deduplicated
        )
    }
}
