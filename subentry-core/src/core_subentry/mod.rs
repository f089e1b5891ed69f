/*
    core_subentry - Subentries and their registry

    - subtree_spec: scope expressions and the scope test
    - subentry: classification of a stored entry into a `Subentry`
    - registry: the live, snapshot-published index of subentries
*/

pub mod errors;
pub mod registry;
pub mod subentry;
pub mod subtree_spec;

pub use errors::{SubentryError, SubentryResult};
pub use registry::{Registered, RegistrySnapshot, SubentryRegistry};
pub use subentry::{
    is_subentry, Capability, CapabilitySet, ConflictBehavior, InheritanceRule, Subentry,
};
pub use subtree_spec::SubtreeSpecification;
