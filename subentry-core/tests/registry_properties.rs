/*
    Registry and evaluator properties

    - resolving the same entry twice yields the same view
    - the view does not depend on the order subentries were added in
    - readers racing a writer always see one whole registry generation
*/

use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use subentry_core::config::EngineConfig;
use subentry_core::core_dit::{Dn, Entry};
use subentry_core::SubentryService;

const CONTAINERS: [&str; 3] = [
    "dc=example,dc=com",
    "ou=people,dc=example,dc=com",
    "ou=staff,ou=people,dc=example,dc=com",
];
const SPECS: [&str; 5] = [
    "{}",
    "{ minimum 1 }",
    "{ base \"ou=staff\" }",
    "{ specificationFilter \"(title=Sales)\" }",
    "{ maximum 1, specificationExclusions { chopBefore:\"ou=staff\" } }",
];
const BEHAVIORS: [&str; 3] = [
    "real-overrides-virtual",
    "virtual-overrides-real",
    "merge-real-and-virtual",
];
const TARGET: &str = "uid=kim,ou=staff,ou=people,dc=example,dc=com";

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

fn subentry(idx: usize, container: usize, spec: usize, behavior: usize, value: u8) -> Entry {
    Entry::new(dn(&format!("cn=s{},{}", idx, CONTAINERS[container])))
        .with_attribute("objectClass", ["top", "subentry", "collectiveAttributeSubentry"])
        .with_attribute("subtreeSpecification", [SPECS[spec]])
        .with_attribute("collectiveConflictBehavior", [BEHAVIORS[behavior]])
        .with_attribute("c-l", [format!("city-{}", value)])
}

fn target() -> Entry {
    Entry::new(dn(TARGET))
        .with_attribute("objectClass", ["top", "person"])
        .with_attribute("title", ["Sales"])
        .with_attribute("c-l", ["city-0"])
}

fn service_with(subentries: Vec<Entry>) -> SubentryService {
    let service = SubentryService::new(EngineConfig::default()).unwrap();
    service.load(subentries).unwrap();
    service.store().add(target()).unwrap();
    service
}

fn subentry_set() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec((0usize..3, 0usize..5, 0usize..3, 0u8..4), 0..8).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(idx, (container, spec, behavior, value))| {
                subentry(idx, container, spec, behavior, value)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_resolve_is_deterministic(subentries in subentry_set()) {
        let service = service_with(subentries);
        let first = service.resolve_dn(&dn(TARGET)).unwrap();
        let second = service.resolve_dn(&dn(TARGET)).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_resolve_ignores_insertion_order(subentries in subentry_set()) {
        let forward = service_with(subentries.clone());
        let backward = service_with(subentries.into_iter().rev().collect());
        prop_assert_eq!(
            forward.resolve_dn(&dn(TARGET)).unwrap(),
            backward.resolve_dn(&dn(TARGET)).unwrap()
        );
    }

    #[test]
    fn prop_contributors_are_applicable(subentries in subentry_set()) {
        let service = service_with(subentries);
        let view = service.resolve_dn(&dn(TARGET)).unwrap();
        let applicable: Vec<Dn> = service
            .get_collective_subentries(&target())
            .iter()
            .map(|s| s.dn().clone())
            .collect();
        for contributor in view.contributors() {
            prop_assert!(applicable.contains(contributor));
        }
    }
}

#[test]
fn test_readers_see_whole_generations() {
    let service = SubentryService::new(EngineConfig::default()).unwrap();
    service.store().add(target()).unwrap();
    let toggled = Entry::new(dn("cn=toggle,dc=example,dc=com"))
        .with_attribute("objectClass", ["top", "subentry", "collectiveAttributeSubentry"])
        .with_attribute("subtreeSpecification", ["{}"])
        .with_attribute("c-o", ["Example Corp"])
        .with_attribute("c-st", ["Savoie"]);
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let view = service.resolve_dn(&dn(TARGET)).unwrap();
                    let entry = view.entry();
                    let with = entry.values_of("c-o") == vec!["Example Corp"]
                        && entry.values_of("c-st") == vec!["Savoie"];
                    let without = !entry.has_attribute("c-o") && !entry.has_attribute("c-st");
                    assert!(with || without, "torn view: {:?}", entry);
                    assert_eq!(with, view.contributors().len() == 1);
                }
            });
        }

        for _ in 0..200 {
            service.store().add(toggled.clone()).unwrap();
            service.store().delete(toggled.dn()).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(service.registry().is_empty());
    assert_eq!(service.registry().generation(), 400);
}
