//! Prometheus metrics for the Atelier server.
//!
//! This module provides metrics for monitoring the server:
//! - HTTP request metrics (latency, counts, in-flight)
//! - WebSocket connection metrics
//! - Driver bridge connectivity
//! - Run state gauges (collected dynamically from the engine)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "atelier_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atelier_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "atelier_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active progress-stream WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "atelier_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by progress event type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atelier_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when a client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Driver Bridge Metrics
// =============================================================================

/// Whether an automation driver is connected (1) or not (0).
pub static DRIVER_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "atelier_driver_connected",
        "Whether an automation driver is connected (1) or not (0)",
    )
    .unwrap()
});

// =============================================================================
// Run Metrics (collected dynamically)
// =============================================================================

/// Run in progress (1 = running, 0 = idle or paused).
pub static RUN_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "atelier_run_active",
        "Whether a run is in progress (1) or not (0)",
    )
    .unwrap()
});

/// Items finished successfully in the current run.
pub static RUN_ITEMS_DONE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "atelier_run_items_done",
        "Items finished successfully in the current run",
    )
    .unwrap()
});

/// Total items in the current run.
pub static RUN_ITEMS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("atelier_run_items_total", "Total items in the current run").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Driver bridge
    registry
        .register(Box::new(DRIVER_CONNECTED.clone()))
        .unwrap();

    // Run state
    registry.register(Box::new(RUN_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(RUN_ITEMS_DONE.clone()))
        .unwrap();
    registry
        .register(Box::new(RUN_ITEMS_TOTAL.clone()))
        .unwrap();

    // Core metrics (runs, items, binder, rotator)
    for metric in atelier_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh the run gauges from the engine's current snapshot.
///
/// Called before encoding so the scrape reflects the live run state.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(snapshot) = state.engine().snapshot().await {
        RUN_ACTIVE.set(if snapshot.running { 1 } else { 0 });
        RUN_ITEMS_DONE.set(snapshot.done as i64);
        RUN_ITEMS_TOTAL.set(snapshot.total as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("atelier_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_all_metrics() {
        // Touch the metrics so they appear in output (Prometheus only
        // outputs metrics that have been accessed).
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        WS_MESSAGES_SENT.with_label_values(&["update"]).inc();
        DRIVER_CONNECTED.set(0);
        RUN_ACTIVE.set(0);
        RUN_ITEMS_DONE.set(0);
        RUN_ITEMS_TOTAL.set(0);

        let output = encode_metrics();

        assert!(output.contains("atelier_http_request_duration_seconds"));
        assert!(output.contains("atelier_http_requests_total"));
        assert!(output.contains("atelier_http_requests_in_flight"));
        assert!(output.contains("atelier_ws_connections_active"));
        assert!(output.contains("atelier_ws_connections_total"));
        assert!(output.contains("atelier_ws_messages_sent_total"));
        assert!(output.contains("atelier_driver_connected"));
        assert!(output.contains("atelier_run_active"));
        assert!(output.contains("atelier_run_items_total"));
    }
}
