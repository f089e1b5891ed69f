/*
    subentry.rs - Subentry classification

    Turns a stored entry carrying a subentry marker into a `Subentry`:
    its scope, its capability tags, the collective attributes it declares,
    its conflict behavior and, for inherited kinds, the inheritance rule.

    Classification happens once, when the entry is added or modified.
    Everything the read path needs is precomputed here.
*/

use crate::config::EngineConfig;
use crate::core_dit::dn::Dn;
use crate::core_dit::entry::{Attribute, Entry};
use crate::core_subentry::errors::{SubentryError, SubentryResult};
use crate::core_subentry::subtree_spec::SubtreeSpecification;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OC_SUBENTRY: &str = "subentry";
pub const OC_LDAP_SUBENTRY: &str = "ldapSubentry";
pub const OC_COLLECTIVE: &str = "collectiveAttributeSubentry";
pub const OC_INHERITED: &str = "inheritedCollectiveAttributeSubentry";
pub const OC_INHERITED_FROM_DN: &str = "inheritedFromDNCollectiveAttributeSubentry";
pub const OC_INHERITED_FROM_RDN: &str = "inheritedFromRDNCollectiveAttributeSubentry";

pub const ATTR_SUBTREE_SPECIFICATION: &str = "subtreeSpecification";
pub const ATTR_CONFLICT_BEHAVIOR: &str = "collectiveConflictBehavior";
pub const ATTR_COLLECTIVE_EXCLUSIONS: &str = "collectiveExclusions";
pub const ATTR_INHERIT_FROM_DN: &str = "inheritFromDNAttribute";
pub const ATTR_INHERIT_ATTRIBUTE: &str = "inheritAttribute";
pub const ATTR_INHERIT_FROM_BASE_RDN: &str = "inheritFromBaseRDN";
pub const ATTR_INHERIT_FROM_RDN_ATTRIBUTE: &str = "inheritFromRDNAttribute";
pub const ATTR_INHERIT_FROM_RDN_TYPE: &str = "inheritFromRDNType";

/// Attribute option marking a value as collective
pub const OPTION_COLLECTIVE: &str = "collective";

/// RFC 3671 collective attribute types
pub const COLLECTIVE_TYPES: [&str; 13] = [
    "c-l",
    "c-st",
    "c-street",
    "c-o",
    "c-ou",
    "c-postalAddress",
    "c-postalCode",
    "c-postOfficeBox",
    "c-physicalDeliveryOfficeName",
    "c-telephoneNumber",
    "c-telexNumber",
    "c-facsimileTelephoneNumber",
    "c-internationalISDNNumber",
];

/// True if the entry carries a subentry marker (RFC 3672 or legacy)
pub fn is_subentry(entry: &Entry) -> bool {
    entry.has_object_class(OC_SUBENTRY) || entry.has_object_class(OC_LDAP_SUBENTRY)
}

fn is_collective_type(name: &str) -> bool {
    COLLECTIVE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// One capability tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Capability {
    CollectiveProvider = 1,
    InheritedFromDn = 2,
    InheritedFromRdn = 4,
    Legacy = 8,
    Plain = 16,
}

const ALL_CAPABILITIES: [Capability; 5] = [
    Capability::CollectiveProvider,
    Capability::InheritedFromDn,
    Capability::InheritedFromRdn,
    Capability::Legacy,
    Capability::Plain,
];

/// Set of capability tags, computed once at classification time
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability as u8;
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability as u8 != 0
    }

    /// Provides collective values, statically or through inheritance
    pub fn is_collective(&self) -> bool {
        self.contains(Capability::CollectiveProvider) || self.is_inherited()
    }

    pub fn is_inherited(&self) -> bool {
        self.contains(Capability::InheritedFromDn) || self.contains(Capability::InheritedFromRdn)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        ALL_CAPABILITIES.into_iter().filter(|c| self.contains(*c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// How virtual values combine with values stored on the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictBehavior {
    /// Stored values win; virtual values are suppressed
    #[default]
    RealOverridesVirtual,
    /// Virtual values replace stored values
    VirtualOverridesReal,
    /// Union, stored values first
    MergeRealAndVirtual,
}

impl ConflictBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictBehavior::RealOverridesVirtual => "real-overrides-virtual",
            ConflictBehavior::VirtualOverridesReal => "virtual-overrides-real",
            ConflictBehavior::MergeRealAndVirtual => "merge-real-and-virtual",
        }
    }
}

impl FromStr for ConflictBehavior {
    type Err = SubentryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real-overrides-virtual" => Ok(ConflictBehavior::RealOverridesVirtual),
            "virtual-overrides-real" => Ok(ConflictBehavior::VirtualOverridesReal),
            "merge-real-and-virtual" => Ok(ConflictBehavior::MergeRealAndVirtual),
            other => Err(SubentryError::Configuration(format!(
                "unsupported {} \"{}\"",
                ATTR_CONFLICT_BEHAVIOR, other
            ))),
        }
    }
}

impl fmt::Display for ConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an inherited subentry finds its source entry
#[derive(Debug, Clone, PartialEq)]
pub enum InheritanceRule {
    /// The target's `dn_attribute` holds the source DN
    FromDn { dn_attribute: String },
    /// The source is `rdn_type=<target's rdn_attribute value>` under `base`
    FromRdn {
        base: Dn,
        rdn_attribute: String,
        rdn_type: String,
    },
}

/// A classified subentry
#[derive(Debug, Clone)]
pub struct Subentry {
    dn: Dn,
    parent: Dn,
    capabilities: CapabilitySet,
    spec: SubtreeSpecification,
    collective_attributes: Vec<Attribute>,
    conflict_behavior: ConflictBehavior,
    inheritance: Option<InheritanceRule>,
    inherit_attributes: Vec<String>,
}

impl Subentry {
    /// Classify a stored entry
    ///
    /// Returns `Ok(None)` when the entry carries no subentry marker (or
    /// only the legacy marker while legacy subentries are disabled).
    pub fn from_entry(entry: &Entry, config: &EngineConfig) -> SubentryResult<Option<Subentry>> {
        let rfc_subentry = entry.has_object_class(OC_SUBENTRY);
        let legacy = !rfc_subentry && entry.has_object_class(OC_LDAP_SUBENTRY);
        if !rfc_subentry && !(legacy && config.legacy_subentries) {
            return Ok(None);
        }

        let dn = entry.dn().clone();
        let parent = dn.parent().unwrap_or_else(Dn::root);

        let spec_values = entry.values_of(ATTR_SUBTREE_SPECIFICATION);
        let spec = match spec_values.as_slice() {
            [] if legacy => SubtreeSpecification::whole_subtree(&parent),
            [] => return Err(SubentryError::MissingSpecification(dn.to_string())),
            [text] => SubtreeSpecification::parse(text, &parent)?,
            _ => {
                return Err(SubentryError::Configuration(format!(
                    "{} is single-valued on {}",
                    ATTR_SUBTREE_SPECIFICATION, dn
                )))
            }
        };

        let mut capabilities = CapabilitySet::default();
        if legacy {
            capabilities.insert(Capability::Legacy);
        }
        if entry.has_object_class(OC_COLLECTIVE) {
            capabilities.insert(Capability::CollectiveProvider);
        }
        if entry.has_object_class(OC_INHERITED_FROM_DN) {
            capabilities.insert(Capability::InheritedFromDn);
        }
        if entry.has_object_class(OC_INHERITED_FROM_RDN) {
            capabilities.insert(Capability::InheritedFromRdn);
        }
        if !capabilities.is_collective() {
            capabilities.insert(Capability::Plain);
        }

        let conflict_behavior = match entry.values_of(ATTR_CONFLICT_BEHAVIOR).as_slice() {
            [] => ConflictBehavior::default(),
            [value] => value.parse()?,
            _ => {
                return Err(SubentryError::Configuration(format!(
                    "{} is single-valued on {}",
                    ATTR_CONFLICT_BEHAVIOR, dn
                )))
            }
        };

        let collective_attributes = if capabilities.contains(Capability::CollectiveProvider) {
            collect_declared(entry)
        } else {
            Vec::new()
        };

        let (inheritance, inherit_attributes) = if capabilities.is_inherited() {
            let (rule, types) = inheritance_settings(entry, &capabilities)?;
            (Some(rule), types)
        } else {
            (None, Vec::new())
        };

        Ok(Some(Subentry {
            dn,
            parent,
            capabilities,
            spec,
            collective_attributes,
            conflict_behavior,
            inheritance,
            inherit_attributes,
        }))
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn parent(&self) -> &Dn {
        &self.parent
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn spec(&self) -> &SubtreeSpecification {
        &self.spec
    }

    /// Declared collective attributes, `collective` option stripped
    pub fn collective_attributes(&self) -> &[Attribute] {
        &self.collective_attributes
    }

    pub fn conflict_behavior(&self) -> ConflictBehavior {
        self.conflict_behavior
    }

    pub fn inheritance(&self) -> Option<&InheritanceRule> {
        self.inheritance.as_ref()
    }

    /// Attribute types read from the inheritance source
    pub fn inherit_attributes(&self) -> &[String] {
        &self.inherit_attributes
    }

    pub fn is_collective(&self) -> bool {
        self.capabilities.is_collective()
    }

    /// Scope test for an ordinary entry
    pub fn applies_to(&self, entry: &Entry) -> bool {
        self.spec.matches(entry)
    }

    /// Same subentry under a new DN, scope re-based against the new parent
    pub fn moved_to(&self, dn: Dn) -> Subentry {
        let parent = dn.parent().unwrap_or_else(Dn::root);
        Subentry {
            spec: self.spec.rebased(&parent),
            dn,
            parent,
            ..self.clone()
        }
    }
}

/// Collect `;collective` attributes and RFC 3671 `c-*` types, option stripped
fn collect_declared(entry: &Entry) -> Vec<Attribute> {
    let mut declared: Vec<Attribute> = Vec::new();
    for attr in entry.attributes() {
        let desc = &attr.description;
        if !desc.has_option(OPTION_COLLECTIVE) && !is_collective_type(desc.name()) {
            continue;
        }
        let exposed = desc.without_option(OPTION_COLLECTIVE);
        let slot = match declared.iter().position(|a| a.description == exposed) {
            Some(idx) => &mut declared[idx],
            None => {
                declared.push(Attribute::new(exposed));
                let last = declared.len() - 1;
                &mut declared[last]
            }
        };
        for value in attr.values() {
            slot.add_value(value.clone());
        }
    }
    declared.retain(|a| !a.is_empty());
    declared
}

fn required<'a>(entry: &'a Entry, attr: &str) -> SubentryResult<&'a str> {
    entry
        .first_value(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SubentryError::Configuration(format!("{} requires {}", entry.dn(), attr)))
}

fn inheritance_settings(
    entry: &Entry,
    capabilities: &CapabilitySet,
) -> SubentryResult<(InheritanceRule, Vec<String>)> {
    if capabilities.contains(Capability::InheritedFromDn)
        && capabilities.contains(Capability::InheritedFromRdn)
    {
        return Err(SubentryError::Configuration(format!(
            "{} cannot be both {} and {}",
            entry.dn(),
            OC_INHERITED_FROM_DN,
            OC_INHERITED_FROM_RDN
        )));
    }

    let inherit_attributes: Vec<String> = entry
        .values_of(ATTR_INHERIT_ATTRIBUTE)
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if inherit_attributes.is_empty() {
        return Err(SubentryError::Configuration(format!(
            "{} requires {}",
            entry.dn(),
            ATTR_INHERIT_ATTRIBUTE
        )));
    }

    let rule = if capabilities.contains(Capability::InheritedFromDn) {
        InheritanceRule::FromDn {
            dn_attribute: required(entry, ATTR_INHERIT_FROM_DN)?.to_string(),
        }
    } else {
        let base_text = required(entry, ATTR_INHERIT_FROM_BASE_RDN)?;
        let base = Dn::parse(base_text).map_err(|e| {
            SubentryError::Configuration(format!(
                "invalid {} \"{}\": {}",
                ATTR_INHERIT_FROM_BASE_RDN, base_text, e
            ))
        })?;
        InheritanceRule::FromRdn {
            base,
            rdn_attribute: required(entry, ATTR_INHERIT_FROM_RDN_ATTRIBUTE)?.to_string(),
            rdn_type: required(entry, ATTR_INHERIT_FROM_RDN_TYPE)?.to_string(),
        }
    };
    Ok((rule, inherit_attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn base(dn: &str, classes: &[&str]) -> Entry {
        Entry::new(Dn::parse(dn).unwrap()).with_attribute("objectClass", classes.iter().copied())
    }

    #[test]
    fn test_ordinary_entry_is_not_subentry() {
        let entry = base("uid=a,dc=example", &["top", "person"]);
        assert!(Subentry::from_entry(&entry, &config()).unwrap().is_none());
    }

    #[test]
    fn test_collective_provider() {
        let entry = base("cn=lang,dc=example", &["top", "subentry", "collectiveAttributeSubentry"])
            .with_attribute("subtreeSpecification", ["{}"])
            .with_attribute("preferredLanguage;collective", ["fr"])
            .with_attribute("c-l", ["Savoie"])
            .with_attribute("c-l;collective", ["Paris"])
            .with_attribute("description", ["not collective"]);

        let sub = Subentry::from_entry(&entry, &config()).unwrap().unwrap();
        assert!(sub.capabilities().contains(Capability::CollectiveProvider));
        assert!(!sub.capabilities().contains(Capability::Plain));
        assert_eq!(sub.conflict_behavior(), ConflictBehavior::RealOverridesVirtual);

        let declared: Vec<String> = sub
            .collective_attributes()
            .iter()
            .map(|a| a.description.to_string())
            .collect();
        assert_eq!(declared, vec!["preferredLanguage", "c-l"]);
        assert_eq!(sub.collective_attributes()[1].values(), ["Savoie", "Paris"]);
    }

    #[test]
    fn test_missing_specification() {
        let entry = base("cn=x,dc=example", &["subentry"]);
        assert!(matches!(
            Subentry::from_entry(&entry, &config()),
            Err(SubentryError::MissingSpecification(_))
        ));
    }

    #[test]
    fn test_legacy_default_scope() {
        let entry = base("cn=old,ou=people,dc=example", &["top", "ldapSubentry"]);
        let sub = Subentry::from_entry(&entry, &config()).unwrap().unwrap();
        assert!(sub.capabilities().contains(Capability::Legacy));
        assert!(sub.capabilities().contains(Capability::Plain));
        assert_eq!(sub.spec().root(), &Dn::parse("ou=people,dc=example").unwrap());
    }

    #[test]
    fn test_legacy_disabled() {
        let entry = base("cn=old,dc=example", &["ldapSubentry"]);
        let config = EngineConfig {
            legacy_subentries: false,
            ..EngineConfig::default()
        };
        assert!(Subentry::from_entry(&entry, &config).unwrap().is_none());
    }

    #[test]
    fn test_conflict_behavior_values() {
        let make = |values: &[&str]| {
            base("cn=x,dc=example", &["subentry", "collectiveAttributeSubentry"])
                .with_attribute("subtreeSpecification", ["{}"])
                .with_attribute("collectiveConflictBehavior", values.iter().copied())
        };

        let sub = Subentry::from_entry(&make(&["Virtual-Overrides-Real"]), &config())
            .unwrap()
            .unwrap();
        assert_eq!(sub.conflict_behavior(), ConflictBehavior::VirtualOverridesReal);

        let unknown = Subentry::from_entry(&make(&["whatever"]), &config());
        assert!(matches!(unknown, Err(SubentryError::Configuration(_))));

        let both = make(&["real-overrides-virtual", "merge-real-and-virtual"]);
        let multi = Subentry::from_entry(&both, &config());
        assert!(matches!(multi, Err(SubentryError::Configuration(_))));
    }

    #[test]
    fn test_inherited_from_dn() {
        let classes = [
            "subentry",
            "inheritedCollectiveAttributeSubentry",
            "inheritedFromDNCollectiveAttributeSubentry",
        ];
        let entry = base("cn=inherit,dc=example", &classes)
            .with_attribute("subtreeSpecification", ["{}"])
            .with_attribute("inheritFromDNAttribute", ["manager"])
            .with_attribute("inheritAttribute", ["postalAddress", "telephoneNumber"]);

        let sub = Subentry::from_entry(&entry, &config()).unwrap().unwrap();
        assert!(sub.is_collective());
        let rule = InheritanceRule::FromDn {
            dn_attribute: "manager".to_string(),
        };
        assert_eq!(sub.inheritance(), Some(&rule));
        assert_eq!(sub.inherit_attributes(), ["postalAddress", "telephoneNumber"]);
    }

    #[test]
    fn test_inherited_missing_settings() {
        let by_dn = ["subentry", "inheritedFromDNCollectiveAttributeSubentry"];
        let no_attr = base("cn=inherit,dc=example", &by_dn)
            .with_attribute("subtreeSpecification", ["{}"])
            .with_attribute("inheritFromDNAttribute", ["manager"]);
        assert!(matches!(
            Subentry::from_entry(&no_attr, &config()),
            Err(SubentryError::Configuration(_))
        ));

        let by_rdn = ["subentry", "inheritedFromRDNCollectiveAttributeSubentry"];
        let no_rdn_type = base("cn=inherit,dc=example", &by_rdn)
            .with_attribute("subtreeSpecification", ["{}"])
            .with_attribute("inheritAttribute", ["telephoneNumber"])
            .with_attribute("inheritFromBaseRDN", ["ou=Roles"])
            .with_attribute("inheritFromRDNAttribute", ["title"]);
        assert!(matches!(
            Subentry::from_entry(&no_rdn_type, &config()),
            Err(SubentryError::Configuration(_))
        ));
    }

    #[test]
    fn test_moved_to_rebases_scope() {
        let entry = base("cn=lang,ou=old,dc=example", &["subentry"])
            .with_attribute("subtreeSpecification", ["{ base \"ou=people\" }"]);
        let sub = Subentry::from_entry(&entry, &config()).unwrap().unwrap();
        let moved = sub.moved_to(Dn::parse("cn=lang,ou=new,dc=example").unwrap());
        assert_eq!(moved.parent(), &Dn::parse("ou=new,dc=example").unwrap());
        assert_eq!(moved.spec().root(), &Dn::parse("ou=people,ou=new,dc=example").unwrap());
    }

    #[test]
    fn test_capability_set() {
        let mut set = CapabilitySet::default();
        assert!(!set.is_collective());
        set.insert(Capability::InheritedFromRdn);
        assert!(set.is_collective());
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Capability::InheritedFromRdn]);
    }
}
