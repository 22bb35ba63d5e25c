//! Statistics tracking for the resolver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::Security;

/// Atomic counters shared by the resolver, scheduler and transports.
pub struct Stats {
    pub queries: AtomicU64,
    pub local_answers: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Queries that joined an identical in-flight query.
    pub deduplicated: AtomicU64,
    pub upstream_queries: AtomicU64,
    pub server_failures: AtomicU64,
    pub secure: AtomicU64,
    pub bogus: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            local_answers: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            upstream_queries: AtomicU64::new(0),
            server_failures: AtomicU64::new(0),
            secure: AtomicU64::new(0),
            bogus: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_local(&self, elapsed: Duration) {
        self.local_answers.fetch_add(1, Ordering::Relaxed);
        self.record_query(elapsed);
    }

    pub fn record_completed(&self, elapsed: Duration, security: &Security) {
        match security {
            Security::Secure => {
                self.secure.fetch_add(1, Ordering::Relaxed);
            }
            Security::Bogus(_) => {
                self.bogus.fetch_add(1, Ordering::Relaxed);
            }
            Security::Insecure | Security::Unchecked => {}
        }
        self.record_query(elapsed);
    }

    fn record_query(&self, elapsed: Duration) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream(&self) {
        self.upstream_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_failure(&self) {
        self.server_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.collect(|counter| counter.load(Ordering::Relaxed))
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        self.collect(|counter| counter.swap(0, Ordering::Relaxed))
    }

    fn collect(&self, read: impl Fn(&AtomicU64) -> u64) -> StatsSnapshot {
        let queries = read(&self.queries);
        let total_us = read(&self.total_response_time_us);

        let avg_response_ms = if queries > 0 {
            (total_us as f64 / queries as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            queries,
            local_answers: read(&self.local_answers),
            cache_hits: read(&self.cache_hits),
            cache_misses: read(&self.cache_misses),
            deduplicated: read(&self.deduplicated),
            upstream_queries: read(&self.upstream_queries),
            server_failures: read(&self.server_failures),
            secure: read(&self.secure),
            bogus: read(&self.bogus),
            avg_response_ms,
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
    pub queries: u64,
    pub local_answers: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub deduplicated: u64,
    pub upstream_queries: u64,
    pub server_failures: u64,
    pub secure: u64,
    pub bogus: u64,
    pub avg_response_ms: f64,
}
