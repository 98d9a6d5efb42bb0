//! Prometheus metrics for the command-line front end.
//!
//! Core counters are registered alongside queue gauges that are refreshed from
//! the scheduler status right before encoding.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use retro2mp4_core::{SchedulerState, SchedulerStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Queue Metrics
// =============================================================================

/// Queue items by status.
pub static QUEUE_ITEMS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("retro2mp4_queue_items", "Queue items by status"),
        &["status"], // "queued", "processing", "completed", "failed"
    )
    .unwrap()
});

/// Whether the scheduler is pulling items (1) or not (0).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "retro2mp4_scheduler_running",
        "Whether the scheduler is running",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    registry.register(Box::new(QUEUE_ITEMS.clone())).unwrap();
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();

    // Core metrics (scheduler, relay)
    for metric in retro2mp4_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Refreshes the gauges from a scheduler status.
pub fn collect_status(status: &SchedulerStatus) {
    let counts = &status.counts;
    QUEUE_ITEMS
        .with_label_values(&["queued"])
        .set(counts.queued as i64);
    QUEUE_ITEMS
        .with_label_values(&["processing"])
        .set(counts.processing as i64);
    QUEUE_ITEMS
        .with_label_values(&["completed"])
        .set(counts.completed as i64);
    QUEUE_ITEMS
        .with_label_values(&["failed"])
        .set(counts.failed as i64);
    SCHEDULER_RUNNING.set(i64::from(status.state == SchedulerState::Running));
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
