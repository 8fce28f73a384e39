//! Counters and duration statistics for a scheduler run.

use super::export::CompletionRecord;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Metrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    dropped: AtomicU64,
    device_faults: AtomicU64,

    // observed durations in nanoseconds
    durations: RwLock<Histogram<u64>>,

    // f64 bit patterns
    online_error: AtomicU64,
    offline_error: AtomicU64,
    hybrid_error: AtomicU64,
    online_samples: AtomicU64,

    start_time: RwLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, max one hour in nanoseconds
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
            .expect("Failed to create histogram");

        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            device_faults: AtomicU64::new(0),
            durations: RwLock::new(histogram),
            online_error: AtomicU64::new(0f64.to_bits()),
            offline_error: AtomicU64::new(0f64.to_bits()),
            hybrid_error: AtomicU64::new(0f64.to_bits()),
            online_samples: AtomicU64::new(0),
            start_time: RwLock::new(Instant::now()),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_device_fault(&self) {
        self.device_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Account one completed task and the error of each predictor against
    /// its observed duration.
    pub fn record_completion(&self, record: &CompletionRecord) {
        self.completed.fetch_add(1, Ordering::Relaxed);

        let nanos = Duration::from_secs_f64(record.actual.max(0.0)).as_nanos();
        let _ = self
            .durations
            .write()
            .saturating_record(u64::try_from(nanos).unwrap_or(u64::MAX));

        add_f64(&self.offline_error, (record.offline - record.actual).abs());
        add_f64(&self.hybrid_error, (record.hybrid - record.actual).abs());
        if let Some(online) = record.online {
            add_f64(&self.online_error, (online - record.actual).abs());
            self.online_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.durations.read();
        let completed = self.completed.load(Ordering::Relaxed);
        let online_samples = self.online_samples.load(Ordering::Relaxed);

        let mean_error = |sum: &AtomicU64, n: u64| {
            if n == 0 {
                None
            } else {
                Some(f64::from_bits(sum.load(Ordering::Relaxed)) / n as f64)
            }
        };

        MetricsSnapshot {
            uptime: self.start_time.read().elapsed(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed,
            dropped: self.dropped.load(Ordering::Relaxed),
            device_faults: self.device_faults.load(Ordering::Relaxed),
            mean_duration_ns: if histogram.len() > 0 {
                histogram.mean() as u64
            } else {
                0
            },
            p50_duration_ns: histogram.value_at_quantile(0.50),
            p95_duration_ns: histogram.value_at_quantile(0.95),
            p99_duration_ns: histogram.value_at_quantile(0.99),
            max_duration_ns: histogram.max(),
            online_mae: mean_error(&self.online_error, online_samples),
            offline_mae: mean_error(&self.offline_error, completed),
            hybrid_mae: mean_error(&self.hybrid_error, completed),
        }
    }

    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.device_faults.store(0, Ordering::Relaxed);
        self.online_error.store(0f64.to_bits(), Ordering::Relaxed);
        self.offline_error.store(0f64.to_bits(), Ordering::Relaxed);
        self.hybrid_error.store(0f64.to_bits(), Ordering::Relaxed);
        self.online_samples.store(0, Ordering::Relaxed);
        self.durations.write().reset();
        *self.start_time.write() = Instant::now();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn add_f64(cell: &AtomicU64, value: f64) {
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        Some((f64::from_bits(bits) + value).to_bits())
    });
}

/// Point-in-time copy of [`Metrics`]. Errors are mean absolute errors in
/// seconds, `None` until there is something to average.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub submitted: u64,
    pub completed: u64,
    pub dropped: u64,
    pub device_faults: u64,
    pub mean_duration_ns: u64,
    pub p50_duration_ns: u64,
    pub p95_duration_ns: u64,
    pub p99_duration_ns: u64,
    pub max_duration_ns: u64,
    pub online_mae: Option<f64>,
    pub offline_mae: Option<f64>,
    pub hybrid_mae: Option<f64>,
}

impl MetricsSnapshot {
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.completed as f64 / seconds
    }

    /// Submitted tasks that neither completed nor were dropped.
    pub fn outstanding(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(online: Option<f64>, offline: f64, hybrid: f64, actual: f64) -> CompletionRecord {
        CompletionRecord {
            task_id: 0,
            configuration: "cfg".into(),
            kernel: "k".into(),
            flop: 1.0,
            online,
            offline,
            hybrid,
            actual,
        }
    }

    #[test]
    fn test_metrics_basic() {
        let metrics = Metrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_completion(&record(None, 0.5, 0.5, 1.0));
        metrics.record_completion(&record(Some(2.5), 1.0, 2.0, 2.0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submitted, 3);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.outstanding(), 1);
        assert!(snapshot.mean_duration_ns > 1_000_000_000);
        assert!((snapshot.online_mae.unwrap() - 0.5).abs() < 1e-12);
        assert!((snapshot.offline_mae.unwrap() - 0.75).abs() < 1e-12);
        assert!((snapshot.hybrid_mae.unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_errors_absent_without_completions() {
        let snapshot = Metrics::new().snapshot();
        assert!(snapshot.online_mae.is_none());
        assert!(snapshot.offline_mae.is_none());
        assert_eq!(snapshot.max_duration_ns, 0);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();
        metrics.record_submitted();
        metrics.record_device_fault();
        metrics.record_dropped(4);
        metrics.record_completion(&record(Some(1.0), 1.0, 1.0, 1.0));

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submitted, 0);
        assert_eq!(snapshot.device_faults, 0);
        assert_eq!(snapshot.dropped, 0);
        assert!(snapshot.hybrid_mae.is_none());
    }
}
