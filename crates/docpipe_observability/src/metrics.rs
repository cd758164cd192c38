//! In-memory counters for pipeline health, adapted for job-kind granularity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance.
pub static METRICS: Metrics = Metrics::new();

/// Pipeline metrics; all fields are atomic for thread-safe access across
/// worker-pool polling tasks.
pub struct Metrics {
    pub jobs_enqueued: AtomicU64,
    pub jobs_dequeued: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_retried: AtomicU64,
    pub jobs_failed_permanently: AtomicU64,

    pub usage_rows_recorded: AtomicU64,
    /// Cumulative cost in micro-USD (cost_usd * 1_000_000), since atomics have no f64.
    pub cumulative_cost_micros: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_enqueued: AtomicU64::new(0),
            jobs_dequeued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_failed_permanently: AtomicU64::new(0),
            usage_rows_recorded: AtomicU64::new(0),
            cumulative_cost_micros: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_dequeued(&self) {
        self.jobs_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_failed_permanently(&self) {
        self.jobs_failed_permanently.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_usage_cost(&self, cost_usd: f64) {
        self.usage_rows_recorded.fetch_add(1, Ordering::Relaxed);
        let micros = (cost_usd * 1_000_000.0).round().max(0.0) as u64;
        self.cumulative_cost_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn cumulative_cost_usd(&self) -> f64 {
        self.cumulative_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_usage_cost_accumulates() {
        let metrics = Metrics::new();
        metrics.record_usage_cost(0.002);
        metrics.record_usage_cost(0.003);
        assert!((metrics.cumulative_cost_usd() - 0.005).abs() < 1e-9);
        assert_eq!(metrics.usage_rows_recorded.load(Ordering::Relaxed), 2);
    }
}
