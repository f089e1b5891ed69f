/*
    registry.rs - Subentry registry

    The authoritative index of valid subentries, kept consistent with the
    entry store through the store's observer table.

    The index is published as an immutable `RegistrySnapshot` through an
    `ArcSwap`. Readers load one snapshot per call and never block. Writers
    build a new snapshot from the current one and publish it with a
    compare-and-swap, retrying from the latest snapshot if another writer
    got there first. Under the entry store the handlers are already
    serialized by the store's write lock, so the retry path is not hit.

    Snapshot order is deterministic: scope-root depth (shallowest first),
    then normalized subentry DN, then registration sequence.
*/

use crate::config::EngineConfig;
use crate::core_dit::dn::Dn;
use crate::core_dit::entry::Entry;
use crate::core_dit::store::{Commit, EntryObserver};
use crate::core_subentry::errors::SubentryResult;
use crate::core_subentry::subentry::Subentry;
use crate::metrics::{record_gauge, MetricsCollector, REGISTRY_SIZE};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// An indexed subentry with its registration sequence number
#[derive(Debug, Clone)]
pub struct Registered {
    seq: u64,
    subentry: Arc<Subentry>,
}

impl Registered {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn subentry(&self) -> &Arc<Subentry> {
        &self.subentry
    }
}

/// Immutable view of the registry
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    next_seq: u64,
    entries: Vec<Registered>,
}

impl RegistrySnapshot {
    /// Monotonic counter bumped on every published change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every indexed subentry, in snapshot order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Subentry>> {
        self.entries.iter().map(|r| &r.subentry)
    }

    pub fn registered(&self) -> &[Registered] {
        &self.entries
    }

    pub fn get(&self, dn: &Dn) -> Option<&Arc<Subentry>> {
        self.entries.iter().find(|r| r.subentry.dn() == dn).map(|r| &r.subentry)
    }

    /// Subentries whose scope contains `entry`, in snapshot order
    pub fn matching(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.iter().filter(|s| s.applies_to(entry)).cloned().collect()
    }

    /// Matching subentries that provide collective or inherited values
    pub fn collective_matching(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.iter().filter(|s| s.is_collective() && s.applies_to(entry)).cloned().collect()
    }

    fn position(&self, dn: &Dn) -> Option<usize> {
        self.entries.iter().position(|r| r.subentry.dn() == dn)
    }

    /// Next snapshot: same content, bumped generation, re-sorted by the caller
    fn successor(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            generation: self.generation + 1,
            next_seq: self.next_seq,
            entries: self.entries.clone(),
        }
    }

    fn insert(&mut self, subentry: Subentry, seq: Option<u64>) {
        let seq = seq.unwrap_or_else(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            seq
        });
        self.entries.push(Registered {
            seq,
            subentry: Arc::new(subentry),
        });
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            let (sa, sb) = (&a.subentry, &b.subentry);
            sa.spec()
                .root()
                .depth()
                .cmp(&sb.spec().root().depth())
                .then_with(|| sa.dn().normalized().cmp(sb.dn().normalized()))
                .then_with(|| a.seq.cmp(&b.seq))
        });
    }
}

/// Live index of subentries
pub struct SubentryRegistry {
    current: ArcSwap<RegistrySnapshot>,
    config: EngineConfig,
    metrics: Arc<MetricsCollector>,
}

impl SubentryRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_metrics(config, Arc::new(MetricsCollector::new()))
    }

    pub fn with_metrics(config: EngineConfig, metrics: Arc<MetricsCollector>) -> Self {
        SubentryRegistry {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            config,
            metrics,
        }
    }

    /// Current snapshot; stays valid while held even if writers publish
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    pub fn get(&self, dn: &Dn) -> Option<Arc<Subentry>> {
        self.current.load().get(dn).cloned()
    }

    /// All subentries whose scope contains `entry`
    pub fn get_subentries(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.current.load().matching(entry)
    }

    /// Subentries that provide collective or inherited values to `entry`
    pub fn get_collective_subentries(&self, entry: &Entry) -> Vec<Arc<Subentry>> {
        self.current.load().collective_matching(entry)
    }

    /// DN-only variant; filters are evaluated against an empty entry
    pub fn get_subentries_for_dn(&self, dn: &Dn) -> Vec<Arc<Subentry>> {
        self.get_subentries(&Entry::new(dn.clone()))
    }

    /// DN-only variant of `get_collective_subentries`
    pub fn get_collective_subentries_for_dn(&self, dn: &Dn) -> Vec<Arc<Subentry>> {
        self.get_collective_subentries(&Entry::new(dn.clone()))
    }

    /// Index a newly added subentry. Ordinary entries are ignored.
    pub fn on_entry_added(&self, entry: &Entry) -> SubentryResult<()> {
        if let Some(subentry) = Subentry::from_entry(entry, &self.config)? {
            self.index(subentry);
        }
        Ok(())
    }

    /// Drop the subentry at `dn`, if any
    pub fn on_entry_deleted(&self, dn: &Dn) {
        self.publish(|current| {
            let idx = current.position(dn)?;
            let mut next = current.successor();
            next.entries.remove(idx);
            debug!(dn = %dn, "subentry removed");
            Some(next)
        });
    }

    /// Re-classify a modified entry, keeping its registration sequence
    pub fn on_entry_modified(&self, dn: &Dn, _old: &Entry, new: &Entry) -> SubentryResult<()> {
        let classified = Subentry::from_entry(new, &self.config)?;
        self.reindex(dn, classified);
        Ok(())
    }

    /// Rewrite the DNs of subentries at or below `old_dn` and re-base their scopes
    pub fn on_entry_moved(&self, old_dn: &Dn, new_dn: &Dn) -> SubentryResult<()> {
        self.rebase(old_dn, new_dn);
        Ok(())
    }

    fn rebase(&self, old_dn: &Dn, new_dn: &Dn) {
        self.publish(|current| {
            if !current.iter().any(|s| s.dn().is_at_or_below(old_dn)) {
                return None;
            }
            let mut next = current.successor();
            for registered in next.entries.iter_mut() {
                if let Some(target) = registered.subentry.dn().rebase(old_dn, new_dn) {
                    debug!(old = %registered.subentry.dn(), new = %target, "re-basing subentry");
                    registered.subentry = Arc::new(registered.subentry.moved_to(target));
                }
            }
            Some(next)
        });
    }

    /// Callback table wiring this registry into an entry store
    ///
    /// Each callback classifies the entry up front and defers publication
    /// until the store commits the write.
    pub fn observer(self: &Arc<Self>) -> EntryObserver {
        let (add, delete, modify, moved) = (self.clone(), self.clone(), self.clone(), self.clone());
        EntryObserver {
            on_add: Box::new(move |entry| {
                let classified = Subentry::from_entry(entry, &add.config)?;
                let registry = add.clone();
                Ok(Box::new(move || {
                    if let Some(subentry) = classified {
                        registry.index(subentry);
                    }
                }) as Commit)
            }),
            on_delete: Box::new(move |dn| delete.on_entry_deleted(dn)),
            on_modify: Box::new(move |dn, _old, new| {
                let classified = Subentry::from_entry(new, &modify.config)?;
                let (registry, dn) = (modify.clone(), dn.clone());
                Ok(Box::new(move || registry.reindex(&dn, classified)) as Commit)
            }),
            on_move: Box::new(move |old_dn, new_dn| {
                let (registry, old_dn, new_dn) = (moved.clone(), old_dn.clone(), new_dn.clone());
                Ok(Box::new(move || registry.rebase(&old_dn, &new_dn)) as Commit)
            }),
        }
    }

    fn index(&self, subentry: Subentry) {
        debug!(dn = %subentry.dn(), capabilities = ?subentry.capabilities(), "indexing subentry");
        self.publish(|current| {
            let mut next = current.successor();
            let seq = next.position(subentry.dn()).map(|idx| next.entries.remove(idx).seq);
            next.insert(subentry.clone(), seq);
            Some(next)
        });
    }

    fn reindex(&self, dn: &Dn, classified: Option<Subentry>) {
        self.publish(|current| {
            let existing = current.position(dn);
            if existing.is_none() && classified.is_none() {
                return None;
            }
            let mut next = current.successor();
            let seq = existing.map(|idx| next.entries.remove(idx).seq);
            match &classified {
                Some(subentry) => {
                    debug!(dn = %dn, "re-indexing modified subentry");
                    next.insert(subentry.clone(), seq);
                }
                None => debug!(dn = %dn, "entry no longer a subentry"),
            }
            Some(next)
        });
    }

    /// Build and publish a successor snapshot. `update` returns `None` for no change.
    fn publish<F>(&self, mut update: F)
    where
        F: FnMut(&RegistrySnapshot) -> Option<RegistrySnapshot>,
    {
        loop {
            let current = self.current.load_full();
            let Some(mut next) = update(&current) else {
                return;
            };
            next.sort();
            let size = next.len();
            let next = Arc::new(next);

            let previous = self.current.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                self.metrics.inc_registry_updates();
                record_gauge(REGISTRY_SIZE, size as f64);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_subentry::errors::SubentryError;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn subentry(d: &str, spec: &str) -> Entry {
        Entry::new(dn(d))
            .with_attribute("objectClass", ["top", "subentry", "collectiveAttributeSubentry"])
            .with_attribute("subtreeSpecification", [spec])
            .with_attribute("c-l", ["somewhere"])
    }

    fn person(d: &str) -> Entry {
        Entry::new(dn(d)).with_attribute("objectClass", ["person"])
    }

    fn names(list: &[Arc<Subentry>]) -> Vec<String> {
        list.iter().map(|s| s.dn().to_string()).collect()
    }

    #[test]
    fn test_add_and_delete() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_added(&person("uid=a,dc=example")).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.generation(), 0);

        registry.on_entry_added(&subentry("cn=s,dc=example", "{}")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.generation(), 1);
        assert_eq!(registry.get_subentries(&person("uid=a,dc=example")).len(), 1);

        registry.on_entry_deleted(&dn("cn=s,dc=example"));
        assert!(registry.is_empty());
        assert!(registry.get_subentries(&person("uid=a,dc=example")).is_empty());
    }

    #[test]
    fn test_delete_unknown_publishes_nothing() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_deleted(&dn("cn=missing"));
        assert_eq!(registry.generation(), 0);
    }

    #[test]
    fn test_invalid_subentry_rejected() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        let result = registry.on_entry_added(&subentry("cn=s,dc=example", "{ bogus 1 }"));
        assert!(matches!(result, Err(SubentryError::Parse { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_order_by_depth_then_dn_then_seq() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_added(&subentry("cn=b,ou=people,dc=example", "{}")).unwrap();
        registry.on_entry_added(&subentry("cn=z,dc=example", "{}")).unwrap();
        registry.on_entry_added(&subentry("cn=a,ou=people,dc=example", "{}")).unwrap();

        let matched = registry.get_subentries(&person("uid=x,ou=people,dc=example"));
        assert_eq!(
            names(&matched),
            vec!["cn=z,dc=example", "cn=a,ou=people,dc=example", "cn=b,ou=people,dc=example"]
        );
    }

    #[test]
    fn test_modify_keeps_sequence() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        let original = subentry("cn=s,dc=example", "{}");
        registry.on_entry_added(&original).unwrap();
        let seq = registry.snapshot().registered()[0].seq();

        let narrowed = subentry("cn=s,dc=example", "{ base \"ou=people\" }");
        registry.on_entry_modified(&dn("cn=s,dc=example"), &original, &narrowed).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.registered()[0].seq(), seq);
        assert!(registry.get_subentries(&person("uid=a,dc=example")).is_empty());
        assert_eq!(registry.get_subentries(&person("uid=a,ou=people,dc=example")).len(), 1);
    }

    #[test]
    fn test_modify_removes_marker() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        let original = subentry("cn=s,dc=example", "{}");
        registry.on_entry_added(&original).unwrap();
        registry
            .on_entry_modified(&dn("cn=s,dc=example"), &original, &person("cn=s,dc=example"))
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_modify_rejects_bad_behavior() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        let original = subentry("cn=s,dc=example", "{}");
        registry.on_entry_added(&original).unwrap();
        let bad = original.clone().with_attribute("collectiveConflictBehavior", ["sometimes"]);
        let result = registry.on_entry_modified(&dn("cn=s,dc=example"), &original, &bad);
        assert!(matches!(result, Err(SubentryError::Configuration(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_move_rebases_nested_subentries() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_added(&subentry("cn=s,ou=old,dc=example", "{}")).unwrap();
        registry.on_entry_moved(&dn("ou=old,dc=example"), &dn("ou=new,dc=example")).unwrap();

        assert!(registry.get(&dn("cn=s,ou=old,dc=example")).is_none());
        let moved = registry.get(&dn("cn=s,ou=new,dc=example")).unwrap();
        assert_eq!(moved.spec().root(), &dn("ou=new,dc=example"));
        assert!(registry.get_subentries(&person("uid=a,ou=old,dc=example")).is_empty());
        assert_eq!(registry.get_subentries(&person("uid=a,ou=new,dc=example")).len(), 1);
    }

    #[test]
    fn test_dn_only_variant_skips_filtered_specs() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_added(&subentry("cn=all,dc=example", "{}")).unwrap();
        let sales = subentry("cn=sales,dc=example", "{specificationFilter \"(title=Sales)\"}");
        registry.on_entry_added(&sales).unwrap();

        let by_dn = registry.get_collective_subentries_for_dn(&dn("uid=a,dc=example"));
        assert_eq!(names(&by_dn), vec!["cn=all,dc=example"]);
    }

    #[test]
    fn test_plain_subentries_not_collective() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        let plain = Entry::new(dn("cn=policy,dc=example"))
            .with_attribute("objectClass", ["subentry"])
            .with_attribute("subtreeSpecification", ["{}"]);
        registry.on_entry_added(&plain).unwrap();

        let target = person("uid=a,dc=example");
        assert_eq!(registry.get_subentries(&target).len(), 1);
        assert!(registry.get_collective_subentries(&target).is_empty());
    }

    #[test]
    fn test_held_snapshot_is_stable() {
        let registry = SubentryRegistry::new(EngineConfig::default());
        registry.on_entry_added(&subentry("cn=s,dc=example", "{}")).unwrap();
        let held = registry.snapshot();
        registry.on_entry_deleted(&dn("cn=s,dc=example"));
        assert_eq!(held.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_refused_write_leaves_registry_untouched() {
        use crate::core_dit::store::{EntryObserver, MemoryEntryStore};

        let store = MemoryEntryStore::new();
        let registry = Arc::new(SubentryRegistry::new(EngineConfig::default()));
        store.register_observer(registry.observer()).unwrap();
        let mut refusing = EntryObserver::noop();
        refusing.on_add = Box::new(|_| Err(SubentryError::Configuration("read-only".to_string())));
        refusing.on_move =
            Box::new(|_, _| Err(SubentryError::Configuration("read-only".to_string())));
        store.register_observer(refusing).unwrap();

        assert!(store.add(subentry("cn=s,dc=example", "{}")).is_err());
        assert_eq!(store.len(), 0);
        assert!(registry.is_empty());
        assert_eq!(registry.generation(), 0);
    }

    #[test]
    fn test_observer_publishes_after_commit() {
        use crate::core_dit::store::MemoryEntryStore;

        let store = MemoryEntryStore::new();
        let registry = Arc::new(SubentryRegistry::new(EngineConfig::default()));
        store.register_observer(registry.observer()).unwrap();

        store.add(subentry("cn=s,ou=old,dc=example", "{}")).unwrap();
        store.modify(subentry("cn=s,ou=old,dc=example", "{ minimum 1 }")).unwrap();
        assert_eq!(registry.get(&dn("cn=s,ou=old,dc=example")).unwrap().spec().minimum(), 1);

        store.add(person("ou=old,dc=example")).unwrap();
        store.rename(&dn("ou=old,dc=example"), &dn("ou=new,dc=example")).unwrap();
        assert!(registry.get(&dn("cn=s,ou=new,dc=example")).is_some());
        assert_eq!(registry.len(), store.len() - 1);
    }
}
