//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler (runs, conversions, failures)
//! - Event relay (subscriber and sink errors)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Batch runs started.
pub static RUNS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("retro2mp4_runs_started_total", "Total batch runs started").unwrap()
});

/// Conversion attempts by result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("retro2mp4_conversions_total", "Total conversion attempts"),
        &["result"], // "completed", "failed", "discarded"
    )
    .unwrap()
});

/// Failures by stage.
pub static FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("retro2mp4_failures_total", "Total failed items by stage"),
        &["kind"], // "output_path", "input", "probe", "conversion", "output"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "retro2mp4_conversion_duration_seconds",
            "Duration of a single item from start to terminal outcome",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Relay Metrics
// =============================================================================

/// Subscriber callbacks that returned an error or panicked.
pub static RELAY_SUBSCRIBER_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "retro2mp4_relay_subscriber_errors_total",
        "Total failed log subscriber invocations",
    )
    .unwrap()
});

/// Failed writes to the durable log.
pub static RELAY_SINK_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "retro2mp4_relay_sink_errors_total",
        "Total failed log sink writes",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Scheduler
        Box::new(RUNS_STARTED.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(FAILURES_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        // Relay
        Box::new(RELAY_SUBSCRIBER_ERRORS.clone()),
        Box::new(RELAY_SINK_ERRORS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        CONVERSIONS_TOTAL.with_label_values(&["completed"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"retro2mp4_conversions_total".to_string()));
    }
}
