//! Prometheus metrics for the relay engine
//!
//! Tracks scheduled passes, fetch failures, per-subscription deliveries,
//! pending ping cleanups and control API traffic.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

use crate::models::{FeedKind, ReconcileReport};

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for engine metrics
struct EngineMetrics {
    passes: CounterVec,
    pass_duration: HistogramVec,
    fetch_errors: CounterVec,
    deliveries: CounterVec,
    persistence_failures: CounterVec,
    last_significant_change: GaugeVec,
    pending_pings: Gauge,
}

/// Container for control API metrics
struct ApiMetrics {
    requests: CounterVec,
}

static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = lotus_relay::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let engine = EngineMetrics {
        passes: register_counter_vec!(
            "relay_passes_total",
            "Scheduled passes by feed and outcome",
            &["feed", "outcome"]
        )?,
        pass_duration: register_histogram_vec!(
            "relay_pass_duration_seconds",
            "Duration of a full scheduled pass in seconds",
            &["feed"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
        fetch_errors: register_counter_vec!(
            "relay_fetch_errors_total",
            "Snapshot fetch failures by feed",
            &["feed"]
        )?,
        deliveries: register_counter_vec!(
            "relay_deliveries_total",
            "Per-subscription deliveries by feed and result",
            &["feed", "result"]
        )?,
        persistence_failures: register_counter_vec!(
            "relay_persistence_failures_total",
            "Message references that could not be stored",
            &["feed"]
        )?,
        last_significant_change: register_gauge_vec!(
            "relay_last_significant_change_timestamp_seconds",
            "Unix time of the last propagated change",
            &["feed"]
        )?,
        pending_pings: register_gauge!(
            "relay_pending_ping_cleanups",
            "Transient ping messages waiting for deletion"
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "relay_api_requests_total",
            "Control API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
    };

    ENGINE_METRICS.set(engine).map_err(|_| "Engine metrics already initialized")?;
    API_METRICS.set(api).map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ENGINE_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one scheduled pass
pub fn record_pass(feed: FeedKind, outcome: &str, duration_secs: f64) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    m.passes.with_label_values(&[feed.as_str(), outcome]).inc();
    m.pass_duration
        .with_label_values(&[feed.as_str()])
        .observe(duration_secs);
}

/// Record a fetch failure
pub fn record_fetch_error(feed: FeedKind) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.fetch_errors.with_label_values(&[feed.as_str()]).inc();
    }
}

/// Record the delivery counts of a reconciliation pass
pub fn record_report(feed: FeedKind, report: &ReconcileReport) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    let counts = [
        ("succeeded", report.succeeded),
        ("failed", report.failed.len()),
        ("skipped", report.skipped),
    ];
    for (result, count) in counts {
        if count > 0 {
            m.deliveries
                .with_label_values(&[feed.as_str(), result])
                .inc_by(count as f64);
        }
    }

    if report.persistence_failures > 0 {
        m.persistence_failures
            .with_label_values(&[feed.as_str()])
            .inc_by(report.persistence_failures as f64);
    }
}

/// Record the time of a propagated change
pub fn record_significant_change(feed: FeedKind, at: chrono::DateTime<chrono::Utc>) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.last_significant_change
            .with_label_values(&[feed.as_str()])
            .set(at.timestamp() as f64);
    }
}

/// Update the pending ping cleanup gauge
pub fn set_pending_pings(count: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.pending_pings.set(count as f64);
    }
}

/// Record a control API request
pub fn record_api_request(endpoint: &str, status: u16) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests.with_label_values(&[endpoint, status_str.as_str()]).inc();
}

// ============================================================================
// Tests
// ============================================================================
