/*
    store.rs - Entry store seam and in-memory store

    The engine consumes an entry store through two seams:
    - `EntryLookup` for single-entry reads (inheritance lookups)
    - `EntryObserver`, a fixed callback table registered at store
      initialization and invoked synchronously on the write path

    `MemoryEntryStore` is the in-memory implementation used by the CLI and
    the tests. Every write holds the store's write lock for its whole
    duration, observers included, so writes are serialized. Reads take the
    read lock for one lookup only.

    Writes are two-phase: every observer checks the write and hands back a
    `Commit`; the commits run only after all observers accepted and the
    store applied the change.
*/

use crate::core_dit::dn::Dn;
use crate::core_dit::entry::Entry;
use crate::core_subentry::errors::{SubentryError, SubentryResult};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Errors raised by entry store writes
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entry already exists at this DN
    #[error("Entry already exists: {0}")]
    AlreadyExists(Dn),

    /// No entry at this DN
    #[error("No such entry: {0}")]
    NotFound(Dn),

    /// Delete of an entry that still has subordinates
    #[error("Entry has subordinates: {0}")]
    NotAllowedOnNonLeaf(Dn),

    /// An observer refused the write
    #[error("Write rejected for {dn}: {source}")]
    Rejected {
        dn: Dn,
        #[source]
        source: SubentryError,
    },

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Helper to convert poison errors into StoreError
fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::Storage("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Read access to stored entries
pub trait EntryLookup: Send + Sync {
    /// Fetch one entry. `None` is a normal outcome.
    fn get_entry(&self, dn: &Dn) -> Option<Arc<Entry>>;
}

impl EntryLookup for BTreeMap<Dn, Arc<Entry>> {
    fn get_entry(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.get(dn).cloned()
    }
}

/// Deferred effect of an accepted write
pub type Commit = Box<dyn FnOnce() + Send>;

type AddFn = Box<dyn Fn(&Entry) -> SubentryResult<Commit> + Send + Sync>;
type DeleteFn = Box<dyn Fn(&Dn) + Send + Sync>;
type ModifyFn = Box<dyn Fn(&Dn, &Entry, &Entry) -> SubentryResult<Commit> + Send + Sync>;
type MoveFn = Box<dyn Fn(&Dn, &Dn) -> SubentryResult<Commit> + Send + Sync>;

/// Write-path callback table
///
/// `on_add`, `on_modify` and `on_move` check the change before the store
/// applies it; an error from any observer aborts the write and no commit
/// runs. `on_delete` runs after the entry is removed.
pub struct EntryObserver {
    pub on_add: AddFn,
    pub on_delete: DeleteFn,
    pub on_modify: ModifyFn,
    pub on_move: MoveFn,
}

impl EntryObserver {
    /// Observer that accepts everything and does nothing
    pub fn noop() -> Self {
        EntryObserver {
            on_add: Box::new(|_| Ok(no_commit())),
            on_delete: Box::new(|_| {}),
            on_modify: Box::new(|_, _, _| Ok(no_commit())),
            on_move: Box::new(|_, _| Ok(no_commit())),
        }
    }
}

fn no_commit() -> Commit {
    Box::new(|| {})
}

/// In-memory entry store
pub struct MemoryEntryStore {
    entries: RwLock<BTreeMap<Dn, Arc<Entry>>>,
    observers: RwLock<Vec<EntryObserver>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        MemoryEntryStore {
            entries: RwLock::new(BTreeMap::new()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback table. Observers run in registration order.
    pub fn register_observer(&self, observer: EntryObserver) -> StoreResult<()> {
        self.observers.write().map_err(handle_poison)?.push(observer);
        Ok(())
    }

    /// Add a new entry
    pub fn add(&self, entry: Entry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(handle_poison)?;
        if entries.contains_key(entry.dn()) {
            return Err(StoreError::AlreadyExists(entry.dn().clone()));
        }

        let observers = self.observers.read().map_err(handle_poison)?;
        let commits = observers
            .iter()
            .map(|observer| (observer.on_add)(&entry))
            .collect::<SubentryResult<Vec<Commit>>>()
            .map_err(|source| StoreError::Rejected {
                dn: entry.dn().clone(),
                source,
            })?;

        debug!(dn = %entry.dn(), "entry added");
        entries.insert(entry.dn().clone(), Arc::new(entry));
        commits.into_iter().for_each(|commit| commit());
        Ok(())
    }

    /// Delete a leaf entry
    pub fn delete(&self, dn: &Dn) -> StoreResult<Arc<Entry>> {
        let mut entries = self.entries.write().map_err(handle_poison)?;
        if !entries.contains_key(dn) {
            return Err(StoreError::NotFound(dn.clone()));
        }
        if entries.keys().any(|k| k.is_below(dn)) {
            return Err(StoreError::NotAllowedOnNonLeaf(dn.clone()));
        }

        let removed = entries.remove(dn).ok_or_else(|| StoreError::NotFound(dn.clone()))?;
        let observers = self.observers.read().map_err(handle_poison)?;
        for observer in observers.iter() {
            (observer.on_delete)(dn);
        }

        debug!(dn = %dn, "entry deleted");
        Ok(removed)
    }

    /// Replace an existing entry with a new version under the same DN
    pub fn modify(&self, entry: Entry) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(handle_poison)?;
        let old = entries
            .get(entry.dn())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(entry.dn().clone()))?;

        let observers = self.observers.read().map_err(handle_poison)?;
        let commits = observers
            .iter()
            .map(|observer| (observer.on_modify)(entry.dn(), &old, &entry))
            .collect::<SubentryResult<Vec<Commit>>>()
            .map_err(|source| StoreError::Rejected {
                dn: entry.dn().clone(),
                source,
            })?;

        debug!(dn = %entry.dn(), "entry modified");
        entries.insert(entry.dn().clone(), Arc::new(entry));
        commits.into_iter().for_each(|commit| commit());
        Ok(())
    }

    /// Move an entry and its whole subtree to a new DN
    pub fn rename(&self, old_dn: &Dn, new_dn: &Dn) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(handle_poison)?;
        if !entries.contains_key(old_dn) {
            return Err(StoreError::NotFound(old_dn.clone()));
        }
        if entries.contains_key(new_dn) {
            return Err(StoreError::AlreadyExists(new_dn.clone()));
        }

        let observers = self.observers.read().map_err(handle_poison)?;
        let commits = observers
            .iter()
            .map(|observer| (observer.on_move)(old_dn, new_dn))
            .collect::<SubentryResult<Vec<Commit>>>()
            .map_err(|source| StoreError::Rejected {
                dn: old_dn.clone(),
                source,
            })?;

        let moved: Vec<Dn> = entries
            .keys()
            .filter(|k| k.is_at_or_below(old_dn))
            .cloned()
            .collect();
        for dn in moved {
            if let (Some(entry), Some(target)) = (entries.remove(&dn), dn.rebase(old_dn, new_dn)) {
                entries.insert(target.clone(), Arc::new(entry.with_dn(target)));
            }
        }

        debug!(old = %old_dn, new = %new_dn, "subtree moved");
        commits.into_iter().for_each(|commit| commit());
        Ok(())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries at or below `base`, in DN order
    pub fn entries_below(&self, base: &Dn) -> StoreResult<Vec<Arc<Entry>>> {
        let entries = self.entries.read().map_err(handle_poison)?;
        Ok(entries.values().filter(|e| e.dn().is_at_or_below(base)).cloned().collect())
    }
}

impl Default for MemoryEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryLookup for MemoryEntryStore {
    fn get_entry(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.entries.read().ok().and_then(|entries| entries.get(dn).cloned())
    }
}
