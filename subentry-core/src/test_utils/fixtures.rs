//! Test fixtures for creating common directory entries
//!
//! Provides builder-style factory functions for ordinary entries and the
//! subentry kinds the engine understands.

use crate::core_dit::{Dn, Entry};

fn entry(dn: &str, classes: &[&str]) -> Entry {
    Entry::new(Dn::parse(dn).unwrap()).with_attribute("objectClass", classes.iter().copied())
}

/// An ordinary person entry
pub fn person(dn: &str) -> Entry {
    entry(dn, &["top", "person", "inetOrgPerson"])
}

/// An organizational unit
pub fn org_unit(dn: &str) -> Entry {
    entry(dn, &["top", "organizationalUnit"])
}

/// A plain RFC 3672 subentry
pub fn subentry(dn: &str, spec: &str) -> Entry {
    entry(dn, &["top", "subentry"]).with_attribute("subtreeSpecification", [spec])
}

/// A collective attribute subentry with no attributes declared yet
pub fn collective_subentry(dn: &str, spec: &str) -> Entry {
    entry(dn, &["top", "subentry", "collectiveAttributeSubentry"])
        .with_attribute("subtreeSpecification", [spec])
}

/// Inherit `inherit` from the entry named by the target's `dn_attribute`
pub fn inherited_from_dn_subentry(
    dn: &str,
    spec: &str,
    dn_attribute: &str,
    inherit: &[&str],
) -> Entry {
    let classes = [
        "top",
        "subentry",
        "inheritedCollectiveAttributeSubentry",
        "inheritedFromDNCollectiveAttributeSubentry",
    ];
    entry(dn, &classes)
        .with_attribute("subtreeSpecification", [spec])
        .with_attribute("inheritFromDNAttribute", [dn_attribute])
        .with_attribute("inheritAttribute", inherit.iter().copied())
}

/// Inherit `inherit` from `rdn_type=<target's rdn_attribute>,base`
pub fn inherited_from_rdn_subentry(
    dn: &str,
    spec: &str,
    base: &str,
    rdn_attribute: &str,
    rdn_type: &str,
    inherit: &[&str],
) -> Entry {
    let classes = [
        "top",
        "subentry",
        "inheritedCollectiveAttributeSubentry",
        "inheritedFromRDNCollectiveAttributeSubentry",
    ];
    entry(dn, &classes)
        .with_attribute("subtreeSpecification", [spec])
        .with_attribute("inheritFromBaseRDN", [base])
        .with_attribute("inheritFromRDNAttribute", [rdn_attribute])
        .with_attribute("inheritFromRDNType", [rdn_type])
        .with_attribute("inheritAttribute", inherit.iter().copied())
}
