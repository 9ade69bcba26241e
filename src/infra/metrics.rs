//! Lock-free metrics collection and periodic reporting
//!
//! Atomics only on the hot path; reporting swaps the windowed counters for a
//! consistent snapshot. All atomics use Relaxed ordering intentionally, they
//! are statistical counters and must not be used for coordination.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const METRICS_NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Percentile estimate from histogram buckets: upper bound of the bucket
/// containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    const UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return UPPER_BOUNDS[i];
        }
    }
    UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the safety engine
pub struct Metrics {
    /// Location samples processed (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Sum of sample processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max sample processing latency (reset on report)
    latency_max_us: AtomicU64,
    /// Sample processing latency histogram (monotonic)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Contained -> uncontained transitions observed (monotonic)
    zone_exits_total: AtomicU64,
    /// Automatic alerts raised by escalation (monotonic)
    automatic_alerts_total: AtomicU64,
    /// Manual panic alerts accepted (monotonic)
    panic_alerts_total: AtomicU64,
    /// Manual submissions rejected by the rate window (monotonic)
    panic_rate_limited_total: AtomicU64,
    /// Alert acknowledgments (monotonic)
    acks_total: AtomicU64,
    /// Event publishes that found no live subscriber (monotonic)
    broadcast_drops_total: AtomicU64,
    /// Push notification failures (monotonic)
    notify_failures_total: AtomicU64,
    /// Subjects currently tracked in the status map (gauge)
    active_subjects: AtomicU64,
    /// Last report time (only touched by the reporter)
    last_report_time: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            zone_exits_total: AtomicU64::new(0),
            automatic_alerts_total: AtomicU64::new(0),
            panic_alerts_total: AtomicU64::new(0),
            panic_rate_limited_total: AtomicU64::new(0),
            acks_total: AtomicU64::new(0),
            broadcast_drops_total: AtomicU64::new(0),
            notify_failures_total: AtomicU64::new(0),
            active_subjects: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    pub fn record_sample(&self, latency_us: u64) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zone_exit(&self) {
        self.zone_exits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_automatic_alert(&self) {
        self.automatic_alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic_alert(&self) {
        self.panic_alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic_rate_limited(&self) {
        self.panic_rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast_drop(&self) {
        self.broadcast_drops_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_subjects(&self, count: u64) {
        self.active_subjects.store(count, Ordering::Relaxed);
    }

    /// Snapshot for the periodic report and the /metrics endpoint.
    /// Windowed fields (rate, avg/max latency) reset on each call.
    pub fn report(&self) -> MetricsSummary {
        let mut last_report = self.last_report_time.lock();
        let elapsed = last_report.elapsed().as_secs_f64().max(0.001);
        *last_report = Instant::now();
        drop(last_report);

        let window_samples = self.samples_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let buckets = load_buckets(&self.latency_buckets);

        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_per_sec: window_samples as f64 / elapsed,
            avg_latency_us: if window_samples > 0 { latency_sum / window_samples } else { 0 },
            max_latency_us: latency_max,
            lat_buckets: buckets,
            lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&buckets, 0.99),
            zone_exits_total: self.zone_exits_total.load(Ordering::Relaxed),
            automatic_alerts_total: self.automatic_alerts_total.load(Ordering::Relaxed),
            panic_alerts_total: self.panic_alerts_total.load(Ordering::Relaxed),
            panic_rate_limited_total: self.panic_rate_limited_total.load(Ordering::Relaxed),
            acks_total: self.acks_total.load(Ordering::Relaxed),
            broadcast_drops_total: self.broadcast_drops_total.load(Ordering::Relaxed),
            notify_failures_total: self.notify_failures_total.load(Ordering::Relaxed),
            active_subjects: self.active_subjects.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub zone_exits_total: u64,
    pub automatic_alerts_total: u64,
    pub panic_alerts_total: u64,
    pub panic_rate_limited_total: u64,
    pub acks_total: u64,
    pub broadcast_drops_total: u64,
    pub notify_failures_total: u64,
    pub active_subjects: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_sec = %format!("{:.1}", self.samples_per_sec),
            avg_latency_us = %self.avg_latency_us,
            p99_latency_us = %self.lat_p99_us,
            active_subjects = %self.active_subjects,
            zone_exits = %self.zone_exits_total,
            automatic_alerts = %self.automatic_alerts_total,
            panic_alerts = %self.panic_alerts_total,
            rate_limited = %self.panic_rate_limited_total,
            broadcast_drops = %self.broadcast_drops_total,
            notify_failures = %self.notify_failures_total,
            "metrics_report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(100_000), 10);
    }

    #[test]
    fn test_report_counts_and_rate_reset() {
        let metrics = Metrics::new();
        metrics.record_sample(150);
        metrics.record_sample(250);
        metrics.record_zone_exit();
        metrics.record_panic_alert();
        metrics.record_broadcast_drop();

        let summary = metrics.report();
        assert_eq!(summary.samples_total, 2);
        assert_eq!(summary.avg_latency_us, 200);
        assert_eq!(summary.zone_exits_total, 1);
        assert_eq!(summary.panic_alerts_total, 1);
        assert_eq!(summary.broadcast_drops_total, 1);

        // Window resets; monotonic counters do not
        let summary = metrics.report();
        assert_eq!(summary.samples_total, 2);
        assert_eq!(summary.avg_latency_us, 0);
        assert_eq!(summary.zone_exits_total, 1);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        buckets[0] = 90;
        buckets[3] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 800);
        assert_eq!(percentile_from_buckets(&[0u64; METRICS_NUM_BUCKETS], 0.99), 0);
    }
}
