/*
    service.rs - Engine facade

    Wires an entry store, a subentry registry and a collective evaluator
    together. The registry's observer is registered with the store when the
    service is built, so every later store write keeps the registry current.
*/

use crate::config::EngineConfig;
use crate::core_collective::evaluator::{AugmentedView, CollectiveEvaluator};
use crate::core_dit::dn::Dn;
use crate::core_dit::entry::Entry;
use crate::core_dit::store::{EntryLookup, MemoryEntryStore, StoreError, StoreResult};
use crate::core_subentry::registry::SubentryRegistry;
use crate::core_subentry::subentry::Subentry;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

pub struct SubentryService {
    store: Arc<MemoryEntryStore>,
    registry: Arc<SubentryRegistry>,
    evaluator: CollectiveEvaluator,
    metrics: Arc<MetricsCollector>,
}

impl SubentryService {
    /// Service over a new, empty in-memory store
    pub fn new(config: EngineConfig) -> StoreResult<Self> {
        Self::with_store(Arc::new(MemoryEntryStore::new()), config)
    }

    /// Service over an existing store
    ///
    /// Subentries already in the store are indexed before the observer is
    /// registered; an invalid one fails construction.
    pub fn with_store(store: Arc<MemoryEntryStore>, config: EngineConfig) -> StoreResult<Self> {
        let metrics = Arc::new(MetricsCollector::new());
        let registry = Arc::new(SubentryRegistry::with_metrics(config.clone(), metrics.clone()));

        for entry in store.entries_below(&Dn::root())? {
            registry
                .on_entry_added(&entry)
                .map_err(|source| StoreError::Rejected {
                    dn: entry.dn().clone(),
                    source,
                })?;
        }
        store.register_observer(registry.observer())?;

        let lookup: Arc<dyn EntryLookup> = store.clone();
        let evaluator = CollectiveEvaluator::new(registry.clone(), lookup, config, metrics.clone());
        debug!(subentries = registry.len(), "subentry service ready");

        Ok(SubentryService {
            store,
            registry,
            evaluator,
            metrics,
        })
    }

    pub fn store(&self) -> &Arc<MemoryEntryStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubentryRegistry> {
        &self.registry
    }

    /// Add entries in order, stopping at the first failure
    pub fn load<I>(&self, entries: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut count = 0;
        for entry in entries {
            self.store.add(entry)?;
            count += 1;
        }
        info!(entries = count, subentries = self.registry.len(), "entries loaded");
        Ok(count)
    }

    /// Effective view of an entry
    pub fn resolve(&self, entry: &Entry) -> AugmentedView {
        self.evaluator.resolve(entry)
    }

    /// Fetch then resolve; `None` when no entry exists at `dn`
    pub fn resolve_dn(&self, dn: &Dn) -> Option<AugmentedView> {
        let entry = self.store.get_entry(dn)?;
        Some(self.evaluator.resolve(&entry))
    }

    pub fn get_subentries(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.registry.get_subentries(entry)
    }

    pub fn get_collective_subentries(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.registry.get_collective_subentries(entry)
    }

    /// Totals since the service was built
    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
