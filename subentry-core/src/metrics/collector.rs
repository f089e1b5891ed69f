//! In-process totals for engine activity

use super::{record_counter, MetricsSnapshot, INHERITANCE_MISSES, REGISTRY_UPDATES, RESOLUTIONS};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts engine activity and forwards each increment to the `metrics` facade
#[derive(Debug, Default)]
pub struct MetricsCollector {
    registry_updates: AtomicU64,
    resolutions: AtomicU64,
    inheritance_misses: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry snapshot was published
    pub fn inc_registry_updates(&self) {
        self.registry_updates.fetch_add(1, Ordering::Relaxed);
        record_counter(REGISTRY_UPDATES, 1);
    }

    pub fn inc_resolutions(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        record_counter(RESOLUTIONS, 1);
    }

    /// An inheritance lookup yielded nothing
    pub fn inc_inheritance_misses(&self) {
        self.inheritance_misses.fetch_add(1, Ordering::Relaxed);
        record_counter(INHERITANCE_MISSES, 1);
    }

    /// Get a snapshot of current totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registry_updates: self.registry_updates.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            inheritance_misses: self.inheritance_misses.load(Ordering::Relaxed),
        }
    }
}
