/*
    exclusions.rs - collectiveExclusions on a target entry
*/

use crate::core_dit::entry::Entry;
use crate::core_subentry::subentry::ATTR_COLLECTIVE_EXCLUSIONS;

/// Sentinel value excluding every collective attribute
pub const EXCLUDE_ALL: &str = "excludeAllCollectiveAttributes";

/// Object identifier form of `EXCLUDE_ALL`
pub const EXCLUDE_ALL_OID: &str = "2.5.18.0";

/// Collective attribute types a target entry opts out of
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    all: bool,
    types: Vec<String>,
}

impl ExclusionSet {
    pub fn from_entry(entry: &Entry) -> Self {
        let mut set = ExclusionSet::default();
        for value in entry.values_of(ATTR_COLLECTIVE_EXCLUSIONS) {
            let value = value.trim();
            if value.eq_ignore_ascii_case(EXCLUDE_ALL) || value == EXCLUDE_ALL_OID {
                set.all = true;
            } else if !value.is_empty() {
                // options on an excluded type are ignored
                let name = value.split(';').next().unwrap_or(value);
                set.types.push(name.to_ascii_lowercase());
            }
        }
        set
    }

    pub fn excludes_all(&self) -> bool {
        self.all
    }

    pub fn excludes(&self, attr_type: &str) -> bool {
        self.all || self.types.iter().any(|t| t.eq_ignore_ascii_case(attr_type))
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.types.is_empty()
    }
}
