//! Metrics registry for chronicle
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; readers tolerate slightly stale values

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the ledger, query engine and audit engine
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Events accepted by append
    events_appended: AtomicU64,
    /// Appends refused (validation or halt)
    events_rejected: AtomicU64,
    /// Events evicted past the retention bound
    events_evicted: AtomicU64,
    /// Notifications dropped because a subscriber queue was full
    subscriber_drops: AtomicU64,
    /// Successful TQL queries
    queries_executed: AtomicU64,
    /// TQL queries refused by a safety rule or the halt gate
    queries_rejected: AtomicU64,
    /// TQL queries past their budget
    queries_timed_out: AtomicU64,
    /// Audit runs
    audits_run: AtomicU64,
    /// Times the halt gate closed
    halts_tripped: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Ledger metrics

    pub fn increment_events_appended(&self) {
        self.events_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_events_evicted(&self, count: u64) {
        self.events_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_subscriber_drops(&self) {
        self.subscriber_drops.fetch_add(1, Ordering::Relaxed);
    }

    // Query metrics

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_timed_out(&self) {
        self.queries_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    // Audit metrics

    pub fn increment_audits_run(&self) {
        self.audits_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_halts_tripped(&self) {
        self.halts_tripped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_appended: self.events_appended.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            subscriber_drops: self.subscriber_drops.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            queries_timed_out: self.queries_timed_out.load(Ordering::Relaxed),
            audits_run: self.audits_run.load(Ordering::Relaxed),
            halts_tripped: self.halts_tripped.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_appended: u64,
    pub events_rejected: u64,
    pub events_evicted: u64,
    pub subscriber_drops: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub queries_timed_out: u64,
    pub audits_run: u64,
    pub halts_tripped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();

        assert_eq!(snapshot.events_appended, 0);
        assert_eq!(snapshot.queries_executed, 0);
        assert_eq!(snapshot.halts_tripped, 0);
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_events_appended();
        registry.increment_events_appended();
        registry.increment_events_rejected();
        registry.add_events_evicted(3);
        registry.increment_subscriber_drops();
        registry.increment_queries_executed();
        registry.increment_queries_rejected();
        registry.increment_queries_timed_out();
        registry.increment_audits_run();
        registry.increment_halts_tripped();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.events_appended, 2);
        assert_eq!(snapshot.events_rejected, 1);
        assert_eq!(snapshot.events_evicted, 3);
        assert_eq!(snapshot.subscriber_drops, 1);
        assert_eq!(snapshot.queries_executed, 1);
        assert_eq!(snapshot.queries_rejected, 1);
        assert_eq!(snapshot.queries_timed_out, 1);
        assert_eq!(snapshot.audits_run, 1);
        assert_eq!(snapshot.halts_tripped, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_queries_executed();

        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["queries_executed"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_events_appended();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().events_appended, 1000);
    }
}
