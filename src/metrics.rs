//! Prometheus metrics collection for bruteguard.
//!
//! - `bruteguard_auth_decisions_total{verdict}` - Attempts by outcome
//! - `bruteguard_active_buckets` - Live buckets after the last sweep
//! - `bruteguard_buckets_evicted_total` - Buckets removed by the sweeper
//! - `bruteguard_list_entries{list}` - Ranges per list
//! - `bruteguard_request_duration_seconds{op}` - Transport latency by operation
//! - `bruteguard_errors_total{op, error}` - Failed operations by error code

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Authentication decisions by verdict.
pub static AUTH_DECISIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Buckets alive after the most recent sweep.
pub static ACTIVE_BUCKETS: OnceLock<IntGauge> = OnceLock::new();

/// Buckets evicted because every attempt expired.
pub static BUCKETS_EVICTED: OnceLock<IntCounter> = OnceLock::new();

/// Ranges held per list.
pub static LIST_ENTRIES: OnceLock<IntGaugeVec> = OnceLock::new();

/// Request latency by transport operation.
pub static REQUEST_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Failed operations by operation and error code.
pub static ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Until then every recorder below is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(AUTH_DECISIONS, IntCounterVec::new(Opts::new("bruteguard_auth_decisions_total", "Authentication decisions by verdict"), &["verdict"]));
    register!(ACTIVE_BUCKETS, IntGauge::new("bruteguard_active_buckets", "Live attempt buckets"));
    register!(BUCKETS_EVICTED, IntCounter::new("bruteguard_buckets_evicted_total", "Buckets evicted by the sweeper"));
    register!(LIST_ENTRIES, IntGaugeVec::new(Opts::new("bruteguard_list_entries", "Ranges per list"), &["list"]));
    register!(REQUEST_LATENCY, HistogramVec::new(
        HistogramOpts::new("bruteguard_request_duration_seconds", "Request latency by operation")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["op"]));
    register!(ERRORS, IntCounterVec::new(Opts::new("bruteguard_errors_total", "Failed operations by error code"), &["op", "error"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recorders
// ============================================================================

#[inline]
pub fn record_decision(verdict: &str) {
    if let Some(c) = AUTH_DECISIONS.get() {
        c.with_label_values(&[verdict]).inc();
    }
}

#[inline]
pub fn set_active_buckets(count: usize) {
    if let Some(g) = ACTIVE_BUCKETS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn record_evicted_buckets(count: usize) {
    if let Some(c) = BUCKETS_EVICTED.get() {
        c.inc_by(count as u64);
    }
}

#[inline]
pub fn set_list_entries(list: &str, count: usize) {
    if let Some(g) = LIST_ENTRIES.get() {
        g.with_label_values(&[list])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Record one transport request with latency.
#[inline]
pub fn record_request(op: &str, duration_secs: f64) {
    if let Some(h) = REQUEST_LATENCY.get() {
        h.with_label_values(&[op]).observe(duration_secs);
    }
}

#[inline]
pub fn record_error(op: &str, error: &str) {
    if let Some(c) = ERRORS.get() {
        c.with_label_values(&[op, error]).inc();
    }
}
