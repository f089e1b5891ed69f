/*
    inheritance.rs - Inherited collective attributes

    Inherited subentries take their values from another entry found
    through the target itself:
    - from DN: the target names the source DN in one of its attributes
      (`manager: cn=boss,...`)
    - from RDN: the target holds a value that, as an RDN under a fixed
      base, names the source (`title: Sales` -> `cn=Sales,ou=Roles,...`)

    One source lookup per subentry per resolution. Inheritance is never
    transitive: values the source itself inherits are not followed. Any
    failure (missing attribute, bad DN, out of scope, no such entry)
    yields an empty result.
*/

use crate::config::EngineConfig;
use crate::core_dit::dn::{Dn, Rdn};
use crate::core_dit::entry::{Attribute, AttributeDescription, Entry};
use crate::core_dit::store::EntryLookup;
use crate::core_subentry::subentry::{InheritanceRule, Subentry};
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves inheritance rules against an entry lookup
pub struct InheritanceResolver<'a> {
    lookup: &'a dyn EntryLookup,
    config: &'a EngineConfig,
    metrics: &'a MetricsCollector,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(
        lookup: &'a dyn EntryLookup,
        config: &'a EngineConfig,
        metrics: &'a MetricsCollector,
    ) -> Self {
        InheritanceResolver {
            lookup,
            config,
            metrics,
        }
    }

    /// Values the subentry's rule yields for `target`, one attribute per
    /// listed inherit type that the source holds
    pub fn resolve(&self, subentry: &Subentry, target: &Entry) -> Vec<Attribute> {
        let attributes = match subentry.inheritance() {
            Some(InheritanceRule::FromDn { dn_attribute }) => self.resolve_from_dn(
                target,
                subentry.parent(),
                dn_attribute,
                subentry.inherit_attributes(),
            ),
            Some(InheritanceRule::FromRdn {
                base,
                rdn_attribute,
                rdn_type,
            }) => self.resolve_from_rdn(
                target,
                subentry.parent(),
                base,
                rdn_attribute,
                rdn_type,
                subentry.inherit_attributes(),
            ),
            None => return Vec::new(),
        };
        if attributes.is_empty() {
            self.metrics.inc_inheritance_misses();
        }
        attributes
    }

    /// Follow the DN held in the target's `dn_attribute`
    pub fn resolve_from_dn(
        &self,
        target: &Entry,
        subentry_parent: &Dn,
        dn_attribute: &str,
        inherit_attributes: &[String],
    ) -> Vec<Attribute> {
        match self.source_from_dn(target, subentry_parent, dn_attribute) {
            Some(source) => extract(&source, inherit_attributes),
            None => Vec::new(),
        }
    }

    /// Build `rdn_type=<target's rdn_attribute>` under `base` and read from it
    pub fn resolve_from_rdn(
        &self,
        target: &Entry,
        subentry_parent: &Dn,
        base: &Dn,
        rdn_attribute: &str,
        rdn_type: &str,
        inherit_attributes: &[String],
    ) -> Vec<Attribute> {
        match self.source_from_rdn(target, subentry_parent, base, rdn_attribute, rdn_type) {
            Some(source) => extract(&source, inherit_attributes),
            None => Vec::new(),
        }
    }

    fn source_from_dn(
        &self,
        target: &Entry,
        subentry_parent: &Dn,
        dn_attribute: &str,
    ) -> Option<Arc<Entry>> {
        let value = target.first_value(dn_attribute)?;
        let source_dn = match Dn::parse(value) {
            Ok(dn) => dn,
            Err(e) => {
                warn!(
                    target_dn = %target.dn(),
                    attribute = dn_attribute,
                    error = %e,
                    "unparseable inheritance DN"
                );
                return None;
            }
        };
        if self.config.enforce_inheritance_root_scope
            && !source_dn.is_at_or_below(subentry_parent)
        {
            warn!(
                target_dn = %target.dn(),
                source = %source_dn,
                scope = %subentry_parent,
                "inheritance source outside subentry scope"
            );
            return None;
        }
        self.fetch(&source_dn)
    }

    fn source_from_rdn(
        &self,
        target: &Entry,
        subentry_parent: &Dn,
        base: &Dn,
        rdn_attribute: &str,
        rdn_type: &str,
    ) -> Option<Arc<Entry>> {
        let value = target.first_value(rdn_attribute)?;
        let base = if base.is_at_or_below(subentry_parent) {
            base.clone()
        } else {
            subentry_parent.concat(base)
        };
        let source_dn = base.child(Rdn::new(rdn_type, value.trim()));
        self.fetch(&source_dn)
    }

    fn fetch(&self, dn: &Dn) -> Option<Arc<Entry>> {
        let found = self.lookup.get_entry(dn);
        if found.is_none() {
            debug!(source = %dn, "inheritance source not found");
        }
        found
    }
}

/// Read each inherit type from the source, in the order listed
fn extract(source: &Entry, inherit_attributes: &[String]) -> Vec<Attribute> {
    inherit_attributes
        .iter()
        .filter_map(|name| {
            let values = source.values_of(name);
            if values.is_empty() {
                return None;
            }
            Some(Attribute::with_values(AttributeDescription::new(name.as_str()), values))
        })
        .collect()
}
