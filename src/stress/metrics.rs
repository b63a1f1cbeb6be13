//! Stress metrics collection.
//!
//! Counters are lock-free atomics; latency goes into an HdrHistogram
//! (3 significant figures over 1 µs – 60 s, recorded in microseconds,
//! clamped at the bounds) behind a mutex. Per-request sub-metrics carry
//! their own histograms. The orchestrator snapshots on a 500 ms cadence
//! into an append-only time series.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use serde::Serialize;

const HIST_MIN_MICROS: u64 = 1;
const HIST_MAX_MICROS: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(HIST_MIN_MICROS, HIST_MAX_MICROS, HIST_SIGFIG)
        .expect("valid histogram bounds")
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    /// Timeouts also count toward the error total.
    Timeout,
}

struct RequestMetrics {
    total: u64,
    success: u64,
    errors: u64,
    histogram: Histogram<u64>,
}

/// Shared metrics sink for one stress run.
pub struct StressMetrics {
    total: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    active_vus: AtomicU64,
    histogram: Mutex<Histogram<u64>>,
    per_request: Mutex<HashMap<String, RequestMetrics>>,
    series: Mutex<Vec<TimePoint>>,
    started: Instant,
    /// (time, total) at the previous snapshot, for interval RPS.
    last_snapshot: Mutex<(Instant, u64)>,
}

impl StressMetrics {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            active_vus: AtomicU64::new(0),
            histogram: Mutex::new(new_histogram()),
            per_request: Mutex::new(HashMap::new()),
            series: Mutex::new(Vec::new()),
            started: now,
            last_snapshot: Mutex::new((now, 0)),
        }
    }

    /// Records one completed request.
    pub fn record(&self, name: &str, duration: Duration, outcome: Outcome) {
        let micros = (duration.as_micros() as u64).clamp(HIST_MIN_MICROS, HIST_MAX_MICROS);
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Timeout => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
        }
        {
            let mut histogram = self.histogram.lock().unwrap();
            let _ = histogram.record(micros);
        }
        let mut per_request = self.per_request.lock().unwrap();
        let entry = per_request
            .entry(name.to_string())
            .or_insert_with(|| RequestMetrics {
                total: 0,
                success: 0,
                errors: 0,
                histogram: new_histogram(),
            });
        entry.total += 1;
        match outcome {
            Outcome::Success => entry.success += 1,
            Outcome::Error | Outcome::Timeout => entry.errors += 1,
        }
        let _ = entry.histogram.record(micros);
    }

    pub fn set_active_vus(&self, count: u64) {
        self.active_vus.store(count, Ordering::Relaxed);
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Takes a time-series point and appends it to the series.
    pub fn snapshot(&self) -> TimePoint {
        let now = Instant::now();
        let total = self.total.load(Ordering::Relaxed);
        let rps = {
            let mut last = self.last_snapshot.lock().unwrap();
            let interval = now.duration_since(last.0).as_secs_f64();
            let delta = total - last.1;
            *last = (now, total);
            if interval > 0.0 {
                delta as f64 / interval
            } else {
                0.0
            }
        };
        let (p50, p95, p99) = {
            let histogram = self.histogram.lock().unwrap();
            (
                to_ms(histogram.value_at_quantile(0.50)),
                to_ms(histogram.value_at_quantile(0.95)),
                to_ms(histogram.value_at_quantile(0.99)),
            )
        };
        let point = TimePoint {
            elapsed_ms: now.duration_since(self.started).as_millis() as u64,
            requests: total,
            errors: self.errors.load(Ordering::Relaxed),
            p50_ms: p50,
            p95_ms: p95,
            p99_ms: p99,
            active_vus: self.active_vus.load(Ordering::Relaxed),
            rps,
        };
        self.series.lock().unwrap().push(point.clone());
        point
    }

    /// Final summary over the run.
    pub fn summary(&self) -> StressSummary {
        let elapsed = self.started.elapsed();
        let total = self.total.load(Ordering::Relaxed);
        let success = self.success.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);

        let histogram = self.histogram.lock().unwrap();
        let latency = LatencySummary {
            min_ms: to_ms(histogram.min()),
            p50_ms: to_ms(histogram.value_at_quantile(0.50)),
            p95_ms: to_ms(histogram.value_at_quantile(0.95)),
            p99_ms: to_ms(histogram.value_at_quantile(0.99)),
            max_ms: to_ms(histogram.max()),
            mean_ms: histogram.mean() / 1000.0,
            stddev_ms: histogram.stdev() / 1000.0,
        };
        drop(histogram);

        let per_request = {
            let map = self.per_request.lock().unwrap();
            let mut rows: Vec<RequestBreakdown> = map
                .iter()
                .map(|(name, m)| RequestBreakdown {
                    name: name.clone(),
                    total: m.total,
                    success: m.success,
                    errors: m.errors,
                    p50_ms: to_ms(m.histogram.value_at_quantile(0.50)),
                    p95_ms: to_ms(m.histogram.value_at_quantile(0.95)),
                    p99_ms: to_ms(m.histogram.value_at_quantile(0.99)),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            rows
        };

        let secs = elapsed.as_secs_f64();
        StressSummary {
            total_requests: total,
            success,
            errors,
            timeouts,
            duration_secs: secs,
            rps: if secs > 0.0 { total as f64 / secs } else { 0.0 },
            success_rate: rate(success, total),
            error_rate: rate(errors, total),
            latency,
            per_request,
            series: self.series.lock().unwrap().clone(),
        }
    }
}

impl Default for StressMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

fn rate(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

/// One 500 ms time-series sample.
#[derive(Debug, Clone, Serialize)]
pub struct TimePoint {
    pub elapsed_ms: u64,
    pub requests: u64,
    pub errors: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub active_vus: u64,
    /// Observed requests/sec since the previous snapshot.
    pub rps: f64,
}

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
}

/// Per-request slice of the totals.
#[derive(Debug, Clone, Serialize)]
pub struct RequestBreakdown {
    pub name: String,
    pub total: u64,
    pub success: u64,
    pub errors: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Final stress run summary.
#[derive(Debug, Clone, Serialize)]
pub struct StressSummary {
    pub total_requests: u64,
    pub success: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub duration_secs: f64,
    pub rps: f64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub latency: LatencySummary,
    pub per_request: Vec<RequestBreakdown>,
    pub series: Vec<TimePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = StressMetrics::new();
        metrics.record("a", Duration::from_millis(10), Outcome::Success);
        metrics.record("a", Duration::from_millis(20), Outcome::Error);
        metrics.record("b", Duration::from_millis(30), Outcome::Timeout);
        let summary = metrics.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.per_request.len(), 2);
        assert_eq!(summary.per_request[0].name, "a");
        assert_eq!(summary.per_request[0].total, 2);
    }

    #[test]
    fn test_latency_percentiles() {
        let metrics = StressMetrics::new();
        for ms in 1..=100u64 {
            metrics.record("r", Duration::from_millis(ms), Outcome::Success);
        }
        let latency = metrics.summary().latency;
        assert!(latency.p50_ms >= 49.0 && latency.p50_ms <= 51.0, "{latency:?}");
        assert!(latency.p99_ms >= 98.0);
        assert!(latency.min_ms >= 0.9 && latency.min_ms <= 1.1);
        assert!(latency.max_ms >= 99.0);
    }

    #[test]
    fn test_out_of_range_durations_are_clamped() {
        let metrics = StressMetrics::new();
        metrics.record("r", Duration::from_secs(120), Outcome::Success);
        metrics.record("r", Duration::from_nanos(1), Outcome::Success);
        let latency = metrics.summary().latency;
        assert!(latency.max_ms <= 60_001.0);
        assert!(latency.min_ms >= 0.0);
    }

    #[test]
    fn test_histogram_precision_round_trip() {
        // Recorded values report back within the HDR 3-digit envelope.
        let metrics = StressMetrics::new();
        let value = Duration::from_micros(123_456);
        for _ in 0..10 {
            metrics.record("r", value, Outcome::Success);
        }
        let p50 = metrics.summary().latency.p50_ms;
        let expected = 123.456;
        assert!((p50 - expected).abs() / expected < 0.001, "p50={p50}");
    }

    #[test]
    fn test_snapshot_series_and_interval_rps() {
        let metrics = StressMetrics::new();
        for _ in 0..10 {
            metrics.record("r", Duration::from_millis(5), Outcome::Success);
        }
        std::thread::sleep(Duration::from_millis(20));
        let point = metrics.snapshot();
        assert_eq!(point.requests, 10);
        assert!(point.rps > 0.0);
        let summary = metrics.summary();
        assert_eq!(summary.series.len(), 1);
    }

    #[test]
    fn test_active_vus_gauge() {
        let metrics = StressMetrics::new();
        metrics.set_active_vus(7);
        assert_eq!(metrics.active_vus(), 7);
        assert_eq!(metrics.snapshot().active_vus, 7);
    }
}
