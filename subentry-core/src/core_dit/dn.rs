/*
    dn.rs - Distinguished names

    Parses and normalizes DNs and RDNs (RFC 4514 string form).

    Features:
    - Escapes: `\,` `\+` `\"` `\\` and hex pairs such as `\2C`
    - Multi-valued RDNs joined with `+`
    - Normalized form (lowercased types, folded values) for equality,
      hashing and ordering
    - Tree relations: parent, child, concatenation, subtree membership
*/

use crate::core_dit::entry::normalize_value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while decoding a DN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("empty RDN component in \"{0}\"")]
    EmptyComponent(String),

    #[error("missing '=' in RDN component \"{0}\"")]
    MissingEquals(String),

    #[error("invalid attribute type \"{0}\"")]
    InvalidAttributeType(String),

    #[error("invalid escape sequence in \"{0}\"")]
    InvalidEscape(String),

    #[error("unterminated quoted value in \"{0}\"")]
    UnterminatedQuote(String),
}

/// Attribute value assertion: one `type=value` pair of an RDN
#[derive(Debug, Clone)]
pub struct Ava {
    attr_type: String,
    value: String,
}

impl Ava {
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Self {
        Ava {
            attr_type: attr_type.into(),
            value: value.into(),
        }
    }

    pub fn attr_type(&self) -> &str {
        &self.attr_type
    }

    /// The unescaped value
    pub fn value(&self) -> &str {
        &self.value
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attr_type.to_ascii_lowercase(),
            escape_value(&normalize_value(&self.value))
        )
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr_type, escape_value(&self.value))
    }
}

/// Relative distinguished name
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Single-valued RDN
    pub fn new(attr_type: impl Into<String>, value: impl Into<String>) -> Self {
        Rdn {
            avas: vec![Ava::new(attr_type, value)],
        }
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// Type of the first assertion
    pub fn attr_type(&self) -> &str {
        &self.avas[0].attr_type
    }

    /// Value of the first assertion
    pub fn value(&self) -> &str {
        &self.avas[0].value
    }

    fn normalized(&self) -> String {
        let mut parts: Vec<String> = self.avas.iter().map(Ava::normalized).collect();
        parts.sort();
        parts.join("+")
    }

    fn parse(component: &str) -> Result<Self, DnError> {
        let mut avas = Vec::new();
        for part in split_unescaped(component, &['+'])? {
            avas.push(parse_ava(part)?);
        }
        Ok(Rdn { avas })
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.avas.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", parts.join("+"))
    }
}

/// Distinguished name, leaf RDN first
///
/// Equality, hashing and ordering use the normalized form, so
/// `CN=Sales, DC=Example` and `cn=sales,dc=example` are the same DN.
#[derive(Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    normalized: String,
}

impl Dn {
    /// The root DN (zero RDNs)
    pub fn root() -> Self {
        Dn {
            rdns: Vec::new(),
            normalized: String::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, DnError> {
        if s.trim().is_empty() {
            return Ok(Dn::root());
        }
        let mut rdns = Vec::new();
        for component in split_unescaped(s, &[',', ';'])? {
            if component.trim().is_empty() {
                return Err(DnError::EmptyComponent(s.to_string()));
            }
            rdns.push(Rdn::parse(component)?);
        }
        Ok(Self::from_rdns(rdns))
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let normalized = rdns.iter().map(Rdn::normalized).collect::<Vec<_>>().join(",");
        Dn { rdns, normalized }
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Leaf RDN, `None` for the root DN
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Immediate child of this DN
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Append a relative DN below this one (`ou=a` under `dc=x` gives `ou=a,dc=x`)
    pub fn concat(&self, relative: &Dn) -> Dn {
        let mut rdns = relative.rdns.clone();
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// True if this DN equals `ancestor` or lies anywhere below it
    pub fn is_at_or_below(&self, ancestor: &Dn) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..].iter().zip(ancestor.rdns.iter()).all(|(a, b)| a == b)
    }

    /// True if this DN lies strictly below `ancestor`
    pub fn is_below(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.is_at_or_below(ancestor)
    }

    /// Number of RDNs between this DN and `ancestor`, if it is at or below it
    pub fn depth_below(&self, ancestor: &Dn) -> Option<usize> {
        if self.is_at_or_below(ancestor) {
            Some(self.rdns.len() - ancestor.rdns.len())
        } else {
            None
        }
    }

    /// Rewrite the `old_base` suffix of this DN to `new_base`
    ///
    /// Returns `None` when this DN is not at or below `old_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        let keep = self.depth_below(old_base)?;
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(new_base.rdns.iter().cloned());
        Some(Self::from_rdns(rdns))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.rdns.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn(\"{}\")", self)
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

/// Split on separators that are neither escaped nor inside a quoted value
fn split_unescaped<'a>(s: &'a str, seps: &[char]) -> Result<Vec<&'a str>, DnError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            c if !quoted && seps.contains(&c) => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if escaped {
        return Err(DnError::InvalidEscape(s.to_string()));
    }
    if quoted {
        return Err(DnError::UnterminatedQuote(s.to_string()));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

fn parse_ava(part: &str) -> Result<Ava, DnError> {
    let (attr_type, raw_value) = part
        .split_once('=')
        .ok_or_else(|| DnError::MissingEquals(part.trim().to_string()))?;

    let attr_type = attr_type.trim();
    if attr_type.is_empty()
        || !attr_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(DnError::InvalidAttributeType(attr_type.to_string()));
    }

    let raw_value = raw_value.trim();
    let value = if raw_value.len() >= 2 && raw_value.starts_with('"') && raw_value.ends_with('"') {
        unescape_value(&raw_value[1..raw_value.len() - 1])?
    } else {
        unescape_value(raw_value)?
    };

    Ok(Ava::new(attr_type, value))
}

fn unescape_value(raw: &str) -> Result<String, DnError> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let first = chars.next().ok_or_else(|| DnError::InvalidEscape(raw.to_string()))?;
        if first.is_ascii_hexdigit() {
            let second = chars
                .next()
                .filter(|c| c.is_ascii_hexdigit())
                .ok_or_else(|| DnError::InvalidEscape(raw.to_string()))?;
            let hex: String = [first, second].iter().collect();
            let byte = u8::from_str_radix(&hex, 16)
                .map_err(|_| DnError::InvalidEscape(raw.to_string()))?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8(bytes).map_err(|_| DnError::InvalidEscape(raw.to_string()))
}

/// Escape a value for the RFC 4514 string form
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
