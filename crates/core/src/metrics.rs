//! Prometheus metrics for the orchestration engine.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Run Metrics
// =============================================================================

/// Runs started total.
pub static RUNS_STARTED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("atelier_runs_started_total", "Total runs started").unwrap());

/// Runs finished total by outcome.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atelier_runs_finished_total", "Total runs finished"),
        &["outcome"], // "completed", "stopped"
    )
    .unwrap()
});

/// Run duration in seconds.
pub static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("atelier_run_duration_seconds", "Duration of completed runs").buckets(
            vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0],
        ),
    )
    .unwrap()
});

// =============================================================================
// Item Metrics
// =============================================================================

/// Items completed total.
pub static ITEMS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_items_completed_total",
        "Total work items that reached done",
    )
    .unwrap()
});

/// Items failed total by reason class.
pub static ITEMS_FAILED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("atelier_items_failed_total", "Total work items that errored"),
        &["reason"], // "open", "timeout", "injection", "transport", "context_lost", "driver"
    )
    .unwrap()
});

// =============================================================================
// Binder / Transport Metrics
// =============================================================================

/// Artifacts renamed through the naming callback.
pub static ARTIFACTS_NAMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_artifacts_named_total",
        "Total artifacts assigned a deterministic output name",
    )
    .unwrap()
});

/// Artifact-creation events that could not be bound to an item.
pub static ARTIFACTS_UNBOUND: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_artifacts_unbound_total",
        "Total artifact events dropped with no resolvable item",
    )
    .unwrap()
});

// =============================================================================
// Rotator Metrics
// =============================================================================

/// Foreground rotations performed.
pub static ROTATOR_FOCUS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "atelier_rotator_focus_total",
        "Total workers brought to the foreground by the rotator",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(ITEMS_COMPLETED.clone()),
        Box::new(ITEMS_FAILED.clone()),
        Box::new(ARTIFACTS_NAMED.clone()),
        Box::new(ARTIFACTS_UNBOUND.clone()),
        Box::new(ROTATOR_FOCUS.clone()),
    ]
}
