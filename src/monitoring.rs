//! Self-monitoring counters for the log monitor
//!
//! Tracks how many lines were read, how many errors were detected, how many
//! alerts were dispatched or suppressed, and how reliably the sinks delivered
//! them. The monitor logs a snapshot on every heartbeat.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Point-in-time view of the monitor's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Non-blank lines read from the log file
    pub lines_processed: u64,
    /// Lines that matched an error keyword
    pub errors_detected: u64,
    /// Alerts handed to the dispatcher
    pub notifications_dispatched: u64,
    /// Alerts dropped by the rate limiter
    pub notifications_suppressed: u64,
    /// Successful sink deliveries since start
    pub sink_successes: u64,
    /// Failed sink deliveries since start
    pub sink_failures: u64,
    /// Sink success rate over the recent window, as a percentage (0-100)
    pub recent_success_rate: f64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// One sink delivery result
#[derive(Debug, Clone)]
struct DeliverySample {
    success: bool,
    timestamp: DateTime<Utc>,
}

/// Shared counters updated by the pipeline and read by the run loop
#[derive(Debug)]
pub struct MonitorStats {
    lines_processed: AtomicU64,
    errors_detected: AtomicU64,
    notifications_dispatched: AtomicU64,
    notifications_suppressed: AtomicU64,
    sink_successes: AtomicU64,
    sink_failures: AtomicU64,
    /// Recent delivery results, bounded by `max_samples`
    recent_deliveries: Mutex<VecDeque<DeliverySample>>,
    max_samples: usize,
    window: Duration,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            lines_processed: AtomicU64::new(0),
            errors_detected: AtomicU64::new(0),
            notifications_dispatched: AtomicU64::new(0),
            notifications_suppressed: AtomicU64::new(0),
            sink_successes: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            recent_deliveries: Mutex::new(VecDeque::new()),
            max_samples: 1000,
            window: Duration::minutes(5),
        }
    }

    pub fn record_line(&self) {
        self.lines_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error_detected(&self) {
        self.errors_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.notifications_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.notifications_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one sink delivery
    pub fn record_sink_result(&self, success: bool) {
        self.record_sink_result_at(success, Utc::now());
    }

    fn record_sink_result_at(&self, success: bool, timestamp: DateTime<Utc>) {
        if success {
            self.sink_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sink_failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.samples();
        samples.push_back(DeliverySample { success, timestamp });
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    fn samples(&self) -> MutexGuard<'_, VecDeque<DeliverySample>> {
        self.recent_deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Success rate of deliveries within the window ending at `now`
    ///
    /// Returns `None` when there were no deliveries in the window.
    fn recent_success_rate_at(&self, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - self.window;
        let samples = self.samples();
        let recent: Vec<_> = samples.iter().filter(|s| s.timestamp >= cutoff).collect();
        if recent.is_empty() {
            return None;
        }
        let successful = recent.iter().filter(|s| s.success).count();
        Some(successful as f64 / recent.len() as f64 * 100.0)
    }

    /// Current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Utc::now();
        StatsSnapshot {
            lines_processed: self.lines_processed.load(Ordering::Relaxed),
            errors_detected: self.errors_detected.load(Ordering::Relaxed),
            notifications_dispatched: self.notifications_dispatched.load(Ordering::Relaxed),
            notifications_suppressed: self.notifications_suppressed.load(Ordering::Relaxed),
            sink_successes: self.sink_successes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            // No recent deliveries counts as healthy
            recent_success_rate: self.recent_success_rate_at(now).unwrap_or(100.0),
            timestamp: now,
        }
    }

    /// Log a liveness line and warn about poor delivery
    pub fn log_heartbeat(&self) -> StatsSnapshot {
        let snapshot = self.snapshot();
        info!(
            "Monitor alive: lines={}, errors={}, dispatched={}, suppressed={}, sink_ok={}, sink_failed={}, success_rate={:.1}%",
            snapshot.lines_processed,
            snapshot.errors_detected,
            snapshot.notifications_dispatched,
            snapshot.notifications_suppressed,
            snapshot.sink_successes,
            snapshot.sink_failures,
            snapshot.recent_success_rate
        );

        if snapshot.recent_success_rate < 90.0 {
            warn!(
                "Low notification success rate: {:.1}%",
                snapshot.recent_success_rate
            );
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_stats_are_zero() {
        let snapshot = MonitorStats::new().snapshot();

        assert_eq!(snapshot.lines_processed, 0);
        assert_eq!(snapshot.errors_detected, 0);
        assert_eq!(snapshot.notifications_dispatched, 0);
        assert_eq!(snapshot.notifications_suppressed, 0);
        assert_eq!(snapshot.recent_success_rate, 100.0);
    }

    #[test]
    fn test_counters() {
        let stats = MonitorStats::new();
        stats.record_line();
        stats.record_line();
        stats.record_error_detected();
        stats.record_dispatched();
        stats.record_suppressed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.lines_processed, 2);
        assert_eq!(snapshot.errors_detected, 1);
        assert_eq!(snapshot.notifications_dispatched, 1);
        assert_eq!(snapshot.notifications_suppressed, 1);
    }

    #[test]
    fn test_sink_success_rate() {
        let stats = MonitorStats::new();
        stats.record_sink_result(true);
        stats.record_sink_result(true);
        stats.record_sink_result(false);
        stats.record_sink_result(true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sink_successes, 3);
        assert_eq!(snapshot.sink_failures, 1);
        assert!((snapshot.recent_success_rate - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_old_samples_leave_the_window() {
        let stats = MonitorStats::new();
        let now = Utc::now();
        stats.record_sink_result_at(false, now - Duration::minutes(10));
        stats.record_sink_result_at(true, now);

        assert_eq!(stats.recent_success_rate_at(now), Some(100.0));
        assert_eq!(
            stats.recent_success_rate_at(now + Duration::minutes(6)),
            None
        );
        // Lifetime totals keep old results
        assert_eq!(stats.snapshot().sink_failures, 1);
    }

    #[test]
    fn test_sample_limit() {
        let stats = MonitorStats::new();
        for i in 0..1200 {
            stats.record_sink_result(i % 2 == 0);
        }

        assert_eq!(stats.samples().len(), stats.max_samples);
        assert_eq!(stats.snapshot().sink_successes, 600);
    }

    #[test]
    fn test_shared_across_threads() {
        let stats = Arc::new(MonitorStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_line();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.snapshot().lines_processed, 800);
    }
}
