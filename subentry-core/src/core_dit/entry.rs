/*
    entry.rs - Directory entries

    An entry is a DN plus an ordered list of attributes. Each attribute has
    a description (type name + options such as `collective`) and an ordered,
    duplicate-free list of values.

    Type names, option names and values compare case-insensitively.
*/

use crate::core_dit::dn::Dn;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ATTR_OBJECT_CLASS: &str = "objectClass";

/// Fold a value for comparison: trim, lowercase, collapse inner whitespace
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Attribute type name plus options, e.g. `preferredLanguage;collective`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDescription {
    name: String,
    options: Vec<String>,
}

impl AttributeDescription {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeDescription {
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Parse `type;opt1;opt2`
    pub fn parse(s: &str) -> Self {
        let mut parts = s.trim().split(';');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let options = parts
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        AttributeDescription { name, options }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(option))
    }

    /// Same description with `option` removed
    pub fn without_option(&self, option: &str) -> Self {
        AttributeDescription {
            name: self.name.clone(),
            options: self
                .options
                .iter()
                .filter(|o| !o.eq_ignore_ascii_case(option))
                .cloned()
                .collect(),
        }
    }

    /// True if the type name matches, regardless of options
    pub fn is_type(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn key(&self) -> String {
        let mut options: Vec<String> =
            self.options.iter().map(|o| o.to_ascii_lowercase()).collect();
        options.sort();
        let mut key = self.name.to_ascii_lowercase();
        for option in options {
            key.push(';');
            key.push_str(&option);
        }
        key
    }
}

impl PartialEq for AttributeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AttributeDescription {}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for option in &self.options {
            write!(f, ";{}", option)?;
        }
        Ok(())
    }
}

/// One attribute of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub description: AttributeDescription,
    values: Vec<String>,
}

impl Attribute {
    pub fn new(description: AttributeDescription) -> Self {
        Attribute {
            description,
            values: Vec::new(),
        }
    }

    pub fn with_values<I, S>(description: AttributeDescription, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attr = Attribute::new(description);
        for value in values {
            attr.add_value(value);
        }
        attr
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Add a value unless an equal one is present. Returns true if added.
    pub fn add_value(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        let needle = normalize_value(value);
        self.values.iter().any(|v| normalize_value(v) == needle)
    }
}

/// A directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            attributes: Vec::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Copy of this entry under another DN
    pub fn with_dn(&self, dn: Dn) -> Entry {
        Entry {
            dn,
            attributes: self.attributes.clone(),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Builder-style: add values under `description`
    pub fn with_attribute<I, S>(mut self, description: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.add_value(description, value);
        }
        self
    }

    /// Add one value to the attribute named by `description`
    pub fn add_value(&mut self, description: &str, value: impl Into<String>) -> bool {
        let desc = AttributeDescription::parse(description);
        match self.attributes.iter_mut().find(|a| a.description == desc) {
            Some(attr) => attr.add_value(value),
            None => {
                let mut attr = Attribute::new(desc);
                attr.add_value(value);
                self.attributes.push(attr);
                true
            }
        }
    }

    /// Replace the attribute with the same description, or append it
    pub fn put_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.description == attribute.description) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Remove every attribute of the given type, whatever its options
    pub fn remove_type(&mut self, name: &str) -> Vec<Attribute> {
        let (removed, kept): (Vec<Attribute>, Vec<Attribute>) =
            self.attributes.drain(..).partition(|a| a.description.is_type(name));
        self.attributes = kept;
        removed
    }

    /// Remove the attribute with exactly this description
    pub fn remove_attribute(&mut self, description: &AttributeDescription) -> Option<Attribute> {
        let idx = self.attributes.iter().position(|a| &a.description == description)?;
        Some(self.attributes.remove(idx))
    }

    /// Attribute with exactly this description
    pub fn attribute(&self, description: &str) -> Option<&Attribute> {
        let desc = AttributeDescription::parse(description);
        self.attributes.iter().find(|a| a.description == desc)
    }

    /// Every attribute of the given type, whatever its options
    pub fn attributes_of_type<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.attributes.iter().filter(move |a| a.description.is_type(name))
    }

    /// All values of the given type, whatever their options
    pub fn values_of(&self, name: &str) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.description.is_type(name))
            .flat_map(|a| a.values().iter().map(String::as_str))
            .collect()
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|a| a.description.is_type(name))
            .find_map(|a| a.values().first())
            .map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.description.is_type(name) && !a.is_empty())
    }

    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.values_of(ATTR_OBJECT_CLASS).iter().any(|oc| oc.eq_ignore_ascii_case(object_class))
    }
}
