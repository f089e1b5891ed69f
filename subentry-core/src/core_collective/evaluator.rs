/*
    evaluator.rs - Collective attribute evaluation

    Computes the effective view of an entry: its stored attributes merged
    with the collective and inherited values of every subentry whose scope
    contains it, plus the operational attribute naming the subentries that
    contributed.

    Evaluation reads one registry snapshot and never writes. Nothing is
    cached between calls.
*/

use crate::config::EngineConfig;
use crate::core_collective::exclusions::ExclusionSet;
use crate::core_collective::inheritance::InheritanceResolver;
use crate::core_dit::dn::Dn;
use crate::core_dit::entry::{Attribute, AttributeDescription, Entry};
use crate::core_dit::store::EntryLookup;
use crate::core_subentry::registry::SubentryRegistry;
use crate::core_subentry::subentry::{is_subentry, Capability, ConflictBehavior, Subentry};
use crate::metrics::{MetricsCollector, Timer, RESOLVE_DURATION};
use std::sync::Arc;
use tracing::debug;

/// Effective view of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedView {
    entry: Entry,
    contributors: Vec<Dn>,
}

impl AugmentedView {
    /// The entry with virtual values applied
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_entry(self) -> Entry {
        self.entry
    }

    /// Subentries that contributed at least one visible value, in match order
    pub fn contributors(&self) -> &[Dn] {
        &self.contributors
    }

    /// `{"dn": ..., "attributes": {description: [values]}}`
    pub fn to_json(&self) -> serde_json::Value {
        let mut attributes = serde_json::Map::new();
        for attr in self.entry.attributes() {
            attributes.insert(attr.description.to_string(), serde_json::json!(attr.values()));
        }
        serde_json::json!({
            "dn": self.entry.dn().to_string(),
            "attributes": attributes,
        })
    }
}

/// Virtual values gathered for one attribute description
struct Candidate {
    description: AttributeDescription,
    behavior: ConflictBehavior,
    values: Vec<String>,
    sources: Vec<usize>,
}

pub struct CollectiveEvaluator {
    registry: Arc<SubentryRegistry>,
    lookup: Arc<dyn EntryLookup>,
    config: EngineConfig,
    metrics: Arc<MetricsCollector>,
}

impl CollectiveEvaluator {
    pub fn new(
        registry: Arc<SubentryRegistry>,
        lookup: Arc<dyn EntryLookup>,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        CollectiveEvaluator {
            registry,
            lookup,
            config,
            metrics,
        }
    }

    /// Compute the effective view of `target`
    pub fn resolve(&self, target: &Entry) -> AugmentedView {
        let timer = Timer::new(RESOLVE_DURATION);
        self.metrics.inc_resolutions();

        if is_subentry(target) {
            timer.stop();
            return AugmentedView {
                entry: target.clone(),
                contributors: Vec::new(),
            };
        }

        let exclusions = ExclusionSet::from_entry(target);
        let applicable = if exclusions.excludes_all() {
            Vec::new()
        } else {
            self.registry.get_collective_subentries(target)
        };

        let candidates = self.collect(target, &applicable, &exclusions);
        let view = self.apply(target, &applicable, candidates);
        timer.stop();
        view
    }

    /// Gather virtual values per description, in match order
    fn collect(
        &self,
        target: &Entry,
        applicable: &[Arc<Subentry>],
        exclusions: &ExclusionSet,
    ) -> Vec<Candidate> {
        let resolver = InheritanceResolver::new(self.lookup.as_ref(), &self.config, &self.metrics);
        let mut candidates: Vec<Candidate> = Vec::new();

        for (idx, subentry) in applicable.iter().enumerate() {
            let mut declared: Vec<Attribute> = Vec::new();
            if subentry.capabilities().contains(Capability::CollectiveProvider) {
                declared.extend(subentry.collective_attributes().iter().cloned());
            }
            if subentry.capabilities().is_inherited() {
                declared.extend(resolver.resolve(subentry, target));
            }

            for attr in declared {
                if attr.is_empty() {
                    continue;
                }
                if exclusions.excludes(attr.description.name()) {
                    debug!(
                        target_dn = %target.dn(),
                        attribute = %attr.description,
                        "collective attribute excluded"
                    );
                    continue;
                }

                let existing = candidates
                    .iter()
                    .position(|c| c.description == attr.description);
                let candidate = match existing {
                    Some(pos) => &mut candidates[pos],
                    None => {
                        candidates.push(Candidate {
                            description: attr.description.clone(),
                            behavior: subentry.conflict_behavior(),
                            values: Vec::new(),
                            sources: Vec::new(),
                        });
                        let last = candidates.len() - 1;
                        &mut candidates[last]
                    }
                };
                for value in attr.values() {
                    if !candidate.values.iter().any(|v| normalize_eq(v, value)) {
                        candidate.values.push(value.clone());
                    }
                }
                if !candidate.sources.contains(&idx) {
                    candidate.sources.push(idx);
                }
            }
        }
        candidates
    }

    /// Resolve conflicts against stored values and build the view
    fn apply(
        &self,
        target: &Entry,
        applicable: &[Arc<Subentry>],
        candidates: Vec<Candidate>,
    ) -> AugmentedView {
        let mut entry = target.clone();
        let mut contributed = vec![false; applicable.len()];

        for candidate in candidates {
            let name = candidate.description.name();
            let stored: Vec<&Attribute> = target.attributes_of_type(name).collect();
            let real: Vec<&String> = stored.iter().flat_map(|a| a.values()).collect();

            let values = match candidate.behavior {
                ConflictBehavior::RealOverridesVirtual if !real.is_empty() => {
                    debug!(
                        target_dn = %target.dn(),
                        attribute = name,
                        "stored values override collective values"
                    );
                    continue;
                }
                ConflictBehavior::RealOverridesVirtual => candidate.values,
                ConflictBehavior::VirtualOverridesReal => {
                    for attr in &stored {
                        entry.remove_attribute(&attr.description);
                    }
                    candidate.values
                }
                ConflictBehavior::MergeRealAndVirtual => {
                    let mut merged: Vec<String> = entry
                        .attribute(&candidate.description.to_string())
                        .map(|a| a.values().to_vec())
                        .unwrap_or_default();
                    for value in candidate.values {
                        let held = real.iter().any(|v| normalize_eq(v, &value));
                        if !held && !merged.contains(&value) {
                            merged.push(value);
                        }
                    }
                    merged
                }
            };

            entry.put_attribute(Attribute::with_values(candidate.description, values));
            for idx in candidate.sources {
                contributed[idx] = true;
            }
        }

        let contributors: Vec<Dn> = applicable
            .iter()
            .zip(contributed)
            .filter(|(_, hit)| *hit)
            .map(|(subentry, _)| subentry.dn().clone())
            .collect();

        entry.remove_type(&self.config.operational_attribute);
        if !contributors.is_empty() {
            entry.put_attribute(Attribute::with_values(
                AttributeDescription::new(self.config.operational_attribute.as_str()),
                contributors.iter().map(|dn| dn.to_string()),
            ));
        }

        AugmentedView {
            entry,
            contributors,
        }
    }
}

fn normalize_eq(a: &str, b: &str) -> bool {
    crate::core_dit::entry::normalize_value(a) == crate::core_dit::entry::normalize_value(b)
}
