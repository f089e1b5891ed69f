/*
    core_collective - Collective attribute evaluation

    - exclusions: `collectiveExclusions` on a target
    - inheritance: DN and RDN indirection to a source entry
    - evaluator: the augmented view of one entry
    - service: store + registry + evaluator wired together
*/

pub mod evaluator;
pub mod exclusions;
pub mod inheritance;
pub mod service;

pub use evaluator::{AugmentedView, CollectiveEvaluator};
pub use exclusions::{ExclusionSet, EXCLUDE_ALL, EXCLUDE_ALL_OID};
pub use inheritance::InheritanceResolver;
pub use service::SubentryService;
