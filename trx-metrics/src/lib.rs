//! Process-wide metrics for the HTTP Dispatcher (§4.6, §5, SPEC_FULL.md §5).
//!
//! Mirrors the reference framework's `quarlus-prometheus` plugin: a single
//! `prometheus::Registry` behind a `OnceLock`, with `IntCounter`/`IntGauge`
//! atomics doing the bookkeeping so recording a request never takes a lock.
//! The one piece of state that genuinely needs a lock is the rolling
//! duration sample buffer `trx_average_duration_ms` is computed from, which
//! the spec caps at the last 1,000 samples.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

const MAX_DURATION_SAMPLES: usize = 1000;

struct Metrics {
    registry: Registry,
    total_requests: IntCounter,
    error_requests: IntCounter,
    active_requests: IntGauge,
    durations_ms: Mutex<VecDeque<f64>>,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let total_requests =
            IntCounter::new("trx_total_requests", "Total HTTP requests served").expect("metric can be created");
        let error_requests = IntCounter::new(
            "trx_error_requests",
            "HTTP requests that completed with a 4xx or 5xx status",
        )
        .expect("metric can be created");
        let active_requests =
            IntGauge::new("trx_active_requests", "HTTP requests currently being serviced").expect("metric can be created");

        registry
            .register(Box::new(total_requests.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(error_requests.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(active_requests.clone()))
            .expect("metric can be registered");

        Metrics {
            registry,
            total_requests,
            error_requests,
            active_requests,
            durations_ms: Mutex::new(VecDeque::with_capacity(MAX_DURATION_SAMPLES)),
        }
    })
}

/// RAII guard incrementing `trx_active_requests` on creation and
/// decrementing it on drop, so every early return from a handler still
/// releases the gauge.
pub struct InFlightGuard;

impl InFlightGuard {
    pub fn start() -> Self {
        metrics().active_requests.inc();
        InFlightGuard
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics().active_requests.dec();
    }
}

/// Records one completed request: always bumps `trx_total_requests`, bumps
/// `trx_error_requests` when `is_error`, and pushes `duration_ms` onto the
/// rolling sample buffer backing `trx_average_duration_ms` (§5: "duration
/// histogram trimmed to the last 1,000 samples").
pub fn record_request(is_error: bool, duration_ms: f64) {
    let m = metrics();
    m.total_requests.inc();
    if is_error {
        m.error_requests.inc();
    }
    let mut samples = m.durations_ms.lock().expect("durations mutex poisoned");
    if samples.len() == MAX_DURATION_SAMPLES {
        samples.pop_front();
    }
    samples.push_back(duration_ms);
}

fn average_duration_ms() -> f64 {
    let samples = metrics().durations_ms.lock().expect("durations mutex poisoned");
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

/// Renders the Prometheus text-exposition body for `GET /metrics` (§4.6):
/// the registry's own counters/gauges plus the derived
/// `trx_average_duration_ms` gauge, which is computed fresh on every scrape
/// rather than kept as a registered metric (its value is a function of the
/// sample buffer, not something anything else increments/sets directly).
pub fn render() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let families = m.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).expect("prometheus encoding never fails for well-formed metrics");
    let mut out = String::from_utf8(buffer).expect("prometheus text encoder emits valid UTF-8");

    out.push_str("# HELP trx_average_duration_ms Average request duration over the last 1000 requests.\n");
    out.push_str("# TYPE trx_average_duration_ms gauge\n");
    out.push_str(&format!("trx_average_duration_ms {}\n", average_duration_ms()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests share one process-wide `OnceLock`, so they assert deltas
    // rather than absolute values to stay independent of test execution order.

    #[test]
    fn render_includes_all_four_metric_names() {
        record_request(false, 12.5);
        let text = render();
        assert!(text.contains("trx_total_requests"));
        assert!(text.contains("trx_error_requests"));
        assert!(text.contains("trx_active_requests"));
        assert!(text.contains("trx_average_duration_ms"));
    }

    #[test]
    fn in_flight_guard_increments_and_decrements() {
        let before = metrics().active_requests.get();
        {
            let _g = InFlightGuard::start();
            assert_eq!(metrics().active_requests.get(), before + 1);
        }
        assert_eq!(metrics().active_requests.get(), before);
    }

    #[test]
    fn duration_buffer_is_capped_at_1000_samples() {
        for _ in 0..1500 {
            record_request(false, 1.0);
        }
        let samples = metrics().durations_ms.lock().unwrap();
        assert_eq!(samples.len(), MAX_DURATION_SAMPLES);
    }

    #[test]
    fn error_requests_tracks_only_errors() {
        let before_total = metrics().total_requests.get();
        let before_err = metrics().error_requests.get();
        record_request(false, 1.0);
        record_request(true, 1.0);
        assert_eq!(metrics().total_requests.get(), before_total + 2);
        assert_eq!(metrics().error_requests.get(), before_err + 1);
    }
}
