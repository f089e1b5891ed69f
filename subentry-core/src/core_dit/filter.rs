/*
    filter.rs - Search filters

    The directory's general filter grammar (RFC 4515 string form) and its
    evaluation against an entry. Subtree specification filters reuse this
    module instead of carrying their own grammar.

    Supported items:
    - (&...) (|...) (!...)
    - equality, approximate (treated as equality), presence
    - substrings with initial/any/final parts
    - >= and <= (numeric when both sides are integers)
*/

use crate::core_dit::entry::{normalize_value, Entry, ATTR_OBJECT_CLASS};
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding a filter string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("empty filter")]
    Empty,

    #[error("unbalanced parentheses at offset {0}")]
    Unbalanced(usize),

    #[error("missing comparison operator in \"{0}\"")]
    MissingOperator(String),

    #[error("invalid attribute description \"{0}\"")]
    InvalidAttribute(String),

    #[error("invalid escape in \"{0}\"")]
    InvalidEscape(String),

    #[error("unsupported filter item \"{0}\"")]
    Unsupported(String),

    #[error("trailing characters after filter: \"{0}\"")]
    Trailing(String),
}

/// Parsed filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterOrEqual { attr: String, value: String },
    LessOrEqual { attr: String, value: String },
    Present { attr: String },
    Substring {
        attr: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Filter {
    /// Parse a filter string. A single item may omit its outer parentheses.
    pub fn parse(s: &str) -> Result<Filter, FilterError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty);
        }
        let owned;
        let text = if trimmed.starts_with('(') {
            trimmed
        } else {
            owned = format!("({})", trimmed);
            owned.as_str()
        };

        let mut parser = Parser {
            input: text,
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos < text.len() {
            return Err(FilterError::Trailing(text[parser.pos..].to_string()));
        }
        Ok(filter)
    }

    /// Evaluate against an entry
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(entry)),
            Filter::Or(items) => items.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
                let needle = normalize_value(value);
                entry.values_of(attr).iter().any(|v| normalize_value(v) == needle)
            }
            Filter::GreaterOrEqual { attr, value } => entry
                .values_of(attr)
                .iter()
                .any(|v| compare_ordered(v, value) >= std::cmp::Ordering::Equal),
            Filter::LessOrEqual { attr, value } => entry
                .values_of(attr)
                .iter()
                .any(|v| compare_ordered(v, value) <= std::cmp::Ordering::Equal),
            Filter::Present { attr } => {
                attr.eq_ignore_ascii_case(ATTR_OBJECT_CLASS) || entry.has_attribute(attr)
            }
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => entry.values_of(attr).iter().any(|v| {
                substring_match(&normalize_value(v), initial.as_deref(), any, last.as_deref())
            }),
        }
    }
}

fn compare_ordered(stored: &str, asserted: &str) -> std::cmp::Ordering {
    match (stored.trim().parse::<i64>(), asserted.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => normalize_value(stored).cmp(&normalize_value(asserted)),
    }
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        let initial = normalize_value(initial);
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = normalize_value(part);
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(normalize_value(last).as_str()),
        None => true,
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self.input[self.pos..].starts_with(' ') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<(), FilterError> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(FilterError::Unbalanced(self.pos))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterError> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(FilterError::Unbalanced(self.pos)),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            items.push(self.parse_filter()?);
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        let mut end = start;
        let mut escaped = false;
        for (i, c) in self.input[start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '(' => return Err(FilterError::Unbalanced(start + i)),
                ')' => {
                    end = start + i;
                    break;
                }
                _ => {}
            }
        }
        if end == start {
            return Err(FilterError::Unbalanced(start));
        }
        self.pos = end;
        parse_simple(&self.input[start..end])
    }
}

fn parse_simple(item: &str) -> Result<Filter, FilterError> {
    let eq = item.find('=').ok_or_else(|| FilterError::MissingOperator(item.to_string()))?;
    let (lhs, op) = match item[..eq].chars().last() {
        Some('>') => (&item[..eq - 1], ">="),
        Some('<') => (&item[..eq - 1], "<="),
        Some('~') => (&item[..eq - 1], "~="),
        Some(':') => return Err(FilterError::Unsupported(item.to_string())),
        _ => (&item[..eq], "="),
    };
    let attr = lhs.trim().to_string();
    if attr.is_empty()
        || !attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')
    {
        return Err(FilterError::InvalidAttribute(attr));
    }
    let raw = &item[eq + 1..];

    match op {
        ">=" => Ok(Filter::GreaterOrEqual {
            attr,
            value: unescape(raw)?,
        }),
        "<=" => Ok(Filter::LessOrEqual {
            attr,
            value: unescape(raw)?,
        }),
        "~=" => Ok(Filter::Approx {
            attr,
            value: unescape(raw)?,
        }),
        _ if raw == "*" => Ok(Filter::Present { attr }),
        _ if has_unescaped_star(raw) => {
            let parts = split_stars(raw);
            let mut parts = parts
                .into_iter()
                .map(|p| unescape(p))
                .collect::<Result<Vec<_>, _>>()?;
            let last = parts.pop().filter(|s| !s.is_empty());
            let initial = if parts.is_empty() {
                None
            } else {
                Some(parts.remove(0))
            };
            let initial = initial.filter(|s| !s.is_empty());
            let any = parts.into_iter().filter(|s| !s.is_empty()).collect();
            Ok(Filter::Substring {
                attr,
                initial,
                any,
                last,
            })
        }
        _ => Ok(Filter::Equality {
            attr,
            value: unescape(raw)?,
        }),
    }
}

fn has_unescaped_star(raw: &str) -> bool {
    let mut escaped = false;
    for c in raw.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '*' {
            return true;
        }
    }
    false
}

fn split_stars(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in raw.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '*' {
            parts.push(&raw[start..i]);
            start = i + 1;
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Decode `\XX` hex escapes in an assertion value
fn unescape(raw: &str) -> Result<String, FilterError> {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' {
            let hex = raw
                .get(i + 1..i + 3)
                .ok_or_else(|| FilterError::InvalidEscape(raw.to_string()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| FilterError::InvalidEscape(raw.to_string()))?;
            bytes.push(byte);
            i += 3;
        } else {
            bytes.push(raw_bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).map_err(|_| FilterError::InvalidEscape(raw.to_string()))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                write!(f, "(&")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Or(items) => {
                write!(f, "(|")?;
                for item in items {
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Equality { attr, value } => write!(f, "({}={})", attr, escape(value)),
            Filter::Approx { attr, value } => write!(f, "({}~={})", attr, escape(value)),
            Filter::GreaterOrEqual { attr, value } => write!(f, "({}>={})", attr, escape(value)),
            Filter::LessOrEqual { attr, value } => write!(f, "({}<={})", attr, escape(value)),
            Filter::Present { attr } => write!(f, "({}=*)", attr),
            Filter::Substring {
                attr,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", attr)?;
                if let Some(initial) = initial {
                    write!(f, "{}", escape(initial))?;
                }
                write!(f, "*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    write!(f, "{}", escape(last))?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_dit::dn::Dn;

    fn person() -> Entry {
        Entry::new(Dn::parse("uid=jdoe,ou=people,dc=example").unwrap())
            .with_attribute("objectClass", ["top", "person", "inetOrgPerson"])
            .with_attribute("cn", ["John Doe"])
            .with_attribute("title", ["Sales"])
            .with_attribute("employeeNumber", ["42"])
    }

    #[test]
    fn test_equality_case_insensitive() {
        let f = Filter::parse("(objectClass=InetOrgPerson)").unwrap();
        assert!(f.matches(&person()));
        assert!(!Filter::parse("(title=Support)").unwrap().matches(&person()));
    }

    #[test]
    fn test_boolean_combinators() {
        let text = "(&(objectClass=person)(|(title=Support)(title=Sales))(!(cn=Jane*)))";
        let f = Filter::parse(text).unwrap();
        assert!(f.matches(&person()));
    }

    #[test]
    fn test_presence() {
        assert!(Filter::parse("(title=*)").unwrap().matches(&person()));
        assert!(!Filter::parse("(manager=*)").unwrap().matches(&person()));
        assert!(Filter::parse("(objectClass=*)").unwrap().matches(&Entry::new(Dn::root())));
    }

    #[test]
    fn test_substrings() {
        let f = Filter::parse("(cn=jo*n*oe)").unwrap();
        assert!(matches!(f, Filter::Substring { .. }));
        assert!(f.matches(&person()));
        assert!(!Filter::parse("(cn=*smith)").unwrap().matches(&person()));
    }

    #[test]
    fn test_ordering_numeric() {
        assert!(Filter::parse("(employeeNumber>=9)").unwrap().matches(&person()));
        assert!(!Filter::parse("(employeeNumber<=9)").unwrap().matches(&person()));
    }

    #[test]
    fn test_missing_parentheses_accepted() {
        assert!(Filter::parse("title=Sales").unwrap().matches(&person()));
    }

    #[test]
    fn test_escapes() {
        let f = Filter::parse(r"(cn=a\2ab)").unwrap();
        let expected = Filter::Equality {
            attr: "cn".to_string(),
            value: "a*b".to_string(),
        };
        assert_eq!(f, expected);
        assert_eq!(f.to_string(), r"(cn=a\2ab)");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Filter::parse("  "), Err(FilterError::Empty));
        assert!(matches!(Filter::parse("(cn=a"), Err(FilterError::Unbalanced(_))));
        assert!(matches!(Filter::parse("(cn)"), Err(FilterError::MissingOperator(_))));
        assert!(matches!(Filter::parse("(cn:dn:=a)"), Err(FilterError::Unsupported(_))));
        assert!(matches!(Filter::parse("(cn=a)(sn=b)"), Err(FilterError::Trailing(_))));
    }

    #[test]
    fn test_display_roundtrip() {
        let text = "(&(objectClass=person)(!(cn=a*b*c)))";
        assert_eq!(Filter::parse(text).unwrap().to_string(), text);
    }
}
