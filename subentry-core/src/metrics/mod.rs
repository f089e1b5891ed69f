//! Metrics for the subentry engine
//!
//! Counters go through the `metrics` facade; no exporter is installed here.
//! The engine also keeps its own `MetricsCollector` so callers can read
//! totals without a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

mod collector;

pub use collector::MetricsCollector;

pub const REGISTRY_UPDATES: &str = "subentry.registry.updates";
pub const REGISTRY_SIZE: &str = "subentry.registry.size";
pub const RESOLUTIONS: &str = "collective.resolutions";
pub const RESOLVE_DURATION: &str = "collective.resolve.duration_ms";
pub const INHERITANCE_MISSES: &str = "collective.inheritance.misses";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Registry metrics
    describe_counter!(REGISTRY_UPDATES, "Number of published registry snapshots");
    describe_gauge!(REGISTRY_SIZE, "Number of indexed subentries");

    // Evaluator metrics
    describe_counter!(RESOLUTIONS, "Number of collective attribute resolutions");
    describe_histogram!(
        RESOLVE_DURATION,
        "Collective attribute resolution duration in milliseconds"
    );
    describe_counter!(INHERITANCE_MISSES, "Inheritance lookups that found no source value");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a gauge metric
pub fn record_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}

/// Totals read from a `MetricsCollector`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub registry_updates: u64,
    pub resolutions: u64,
    pub inheritance_misses: u64,
}
