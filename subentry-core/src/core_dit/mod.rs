/*
    core_dit - Directory information tree model

    The pieces of the directory this engine reads from:
    - DNs and RDNs
    - Entries and attribute descriptions
    - The general search filter grammar
    - The entry store seam (lookup + write-path observers) and an
      in-memory store
    - LDIF content reader
*/

pub mod dn;
pub mod entry;
pub mod filter;
pub mod ldif;
pub mod store;

pub use dn::{Dn, DnError, Rdn};
pub use entry::{Attribute, AttributeDescription, Entry};
pub use filter::{Filter, FilterError};
pub use ldif::{parse_ldif, LdifError};
pub use store::{Commit, EntryLookup, EntryObserver, MemoryEntryStore, StoreError, StoreResult};
