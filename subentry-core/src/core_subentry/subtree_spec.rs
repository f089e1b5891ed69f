/*
    subtree_spec.rs - Subtree specification parser and matcher

    A subtree specification scopes a subentry to a region of the tree:

        { base "ou=people", minimum 1, maximum 3,
          specificationExclusions { chopBefore:"ou=contractors" },
          specificationFilter "(objectClass=person)" }

    Components are comma-separated, order-insensitive and all optional.
    `base`, `chopBefore` and `chopAfter` are relative to the parent of the
    owning subentry. The filter uses the general directory filter grammar.
*/

use crate::core_dit::dn::Dn;
use crate::core_dit::entry::Entry;
use crate::core_dit::filter::Filter;
use crate::core_subentry::errors::{SubentryError, SubentryResult};
use crate::core_subentry::subentry::is_subentry;
use std::fmt;

const KW_BASE: &str = "base";
const KW_FILTER: &str = "specificationFilter";
const KW_MINIMUM: &str = "minimum";
const KW_MAXIMUM: &str = "maximum";
const KW_EXCLUSIONS: &str = "specificationExclusions";
const KW_CHOP_BEFORE: &str = "chopBefore";
const KW_CHOP_AFTER: &str = "chopAfter";

/// Token used in errors when the text ends too early
const END_OF_INPUT: &str = "<end of input>";

/// Parsed subtree specification, resolved against the owning subentry's parent
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeSpecification {
    /// Absolute scope root: subentry parent + base
    root: Dn,
    base: Dn,
    filter: Option<Filter>,
    minimum: usize,
    maximum: Option<usize>,
    chop_before: Vec<Dn>,
    chop_after: Vec<Dn>,
}

impl SubtreeSpecification {
    /// The whole subtree below `parent` with no refinements
    pub fn whole_subtree(parent: &Dn) -> Self {
        SubtreeSpecification {
            root: parent.clone(),
            base: Dn::root(),
            filter: None,
            minimum: 0,
            maximum: None,
            chop_before: Vec::new(),
            chop_after: Vec::new(),
        }
    }

    /// Parse `text` relative to `parent`, the owning subentry's parent DN
    pub fn parse(text: &str, parent: &Dn) -> SubentryResult<Self> {
        let mut spec = Self::whole_subtree(parent);
        let mut parser = SpecParser {
            input: text,
            pos: 0,
        };
        let mut seen: Vec<&'static str> = Vec::new();

        parser.expect('{')?;
        if !parser.eat('}') {
            loop {
                let word = parser.keyword()?;
                let keyword = [KW_BASE, KW_FILTER, KW_MINIMUM, KW_MAXIMUM, KW_EXCLUSIONS]
                    .into_iter()
                    .find(|k| k.eq_ignore_ascii_case(&word))
                    .ok_or_else(|| {
                        SubentryError::parse(&word, "unknown subtree specification component")
                    })?;
                if seen.contains(&keyword) {
                    return Err(SubentryError::parse(&word, "duplicate component"));
                }
                seen.push(keyword);

                match keyword {
                    KW_BASE => spec.base = parser.quoted_dn()?,
                    KW_FILTER => {
                        let text = parser.quoted()?;
                        let filter = Filter::parse(&text).map_err(|e| {
                            let reason = format!("invalid specificationFilter: {}", e);
                            SubentryError::parse(&text, reason)
                        })?;
                        spec.filter = Some(filter);
                    }
                    KW_MINIMUM => spec.minimum = parser.number()?,
                    KW_MAXIMUM => spec.maximum = Some(parser.number()?),
                    _ => parser.exclusions(&mut spec.chop_before, &mut spec.chop_after)?,
                }

                if parser.eat(',') {
                    continue;
                }
                parser.expect('}')?;
                break;
            }
        }

        parser.skip_whitespace();
        if let Some(rest) = parser.rest() {
            return Err(SubentryError::parse(rest, "trailing characters after specification"));
        }

        spec.root = parent.concat(&spec.base);
        Ok(spec)
    }

    /// Resolve the same specification against a new subentry parent
    pub fn rebased(&self, parent: &Dn) -> Self {
        SubtreeSpecification {
            root: parent.concat(&self.base),
            ..self.clone()
        }
    }

    /// Absolute scope root
    pub fn root(&self) -> &Dn {
        &self.root
    }

    pub fn base(&self) -> &Dn {
        &self.base
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn minimum(&self) -> usize {
        self.minimum
    }

    pub fn maximum(&self) -> Option<usize> {
        self.maximum
    }

    /// Test whether `candidate` falls in scope
    pub fn matches(&self, candidate: &Entry) -> bool {
        !is_subentry(candidate) && self.matches_dn(candidate.dn()) && self.matches_filter(candidate)
    }

    /// Structural part of the scope test: root, depth and exclusions
    pub fn matches_dn(&self, dn: &Dn) -> bool {
        let Some(depth) = dn.depth_below(&self.root) else {
            return false;
        };
        if depth < self.minimum || self.maximum.is_some_and(|max| depth > max) {
            return false;
        }
        if self.chop_before.iter().any(|chop| dn.is_at_or_below(&self.root.concat(chop))) {
            return false;
        }
        !self.chop_after.iter().any(|chop| dn.is_below(&self.root.concat(chop)))
    }

    fn matches_filter(&self, candidate: &Entry) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(candidate))
    }
}

impl fmt::Display for SubtreeSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.base.is_root() {
            parts.push(format!("{} {}", KW_BASE, quote(&self.base.to_string())));
        }
        if self.minimum > 0 {
            parts.push(format!("{} {}", KW_MINIMUM, self.minimum));
        }
        if let Some(max) = self.maximum {
            parts.push(format!("{} {}", KW_MAXIMUM, max));
        }
        if !self.chop_before.is_empty() || !self.chop_after.is_empty() {
            let chops: Vec<String> = self
                .chop_before
                .iter()
                .map(|dn| format!("{}:{}", KW_CHOP_BEFORE, quote(&dn.to_string())))
                .chain(
                    self.chop_after
                        .iter()
                        .map(|dn| format!("{}:{}", KW_CHOP_AFTER, quote(&dn.to_string()))),
                )
                .collect();
            parts.push(format!("{} {{ {} }}", KW_EXCLUSIONS, chops.join(", ")));
        }
        if let Some(filter) = &self.filter {
            parts.push(format!("{} {}", KW_FILTER, quote(&filter.to_string())));
        }
        if parts.is_empty() {
            write!(f, "{{}}")
        } else {
            write!(f, "{{ {} }}", parts.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

struct SpecParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SpecParser<'a> {
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> Option<&'a str> {
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Token at the current position, for error messages
    fn current_token(&self) -> String {
        match self.rest() {
            Some(rest) => rest
                .split(|c: char| c.is_whitespace() || c == ',')
                .next()
                .unwrap_or(rest)
                .to_string(),
            None => END_OF_INPUT.to_string(),
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> SubentryResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SubentryError::parse(self.current_token(), format!("expected '{}'", expected)))
        }
    }

    fn keyword(&mut self) -> SubentryResult<String> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(SubentryError::parse(self.current_token(), "expected a component keyword"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Double-quoted string with `""` as the escaped quote
    fn quoted(&mut self) -> SubentryResult<String> {
        self.skip_whitespace();
        if self.peek() != Some('"') {
            return Err(SubentryError::parse(self.current_token(), "expected a quoted string"));
        }
        let start = self.pos;
        self.pos += 1;

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(SubentryError::parse(
                    &self.input[start..],
                    "unterminated quoted string",
                ));
            };
            self.pos += c.len_utf8();
            if c != '"' {
                out.push(c);
                continue;
            }
            if self.peek() == Some('"') {
                self.pos += 1;
                out.push('"');
                continue;
            }
            return Ok(out);
        }
    }

    fn quoted_dn(&mut self) -> SubentryResult<Dn> {
        let text = self.quoted()?;
        Dn::parse(&text).map_err(|e| SubentryError::parse(&text, format!("invalid DN: {}", e)))
    }

    fn number(&mut self) -> SubentryResult<usize> {
        self.skip_whitespace();
        let token = self.current_token();
        let digits: String = self.input[self.pos..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return Err(SubentryError::parse(token, "expected a non-negative integer"));
        }
        self.pos += digits.len();
        if self.peek().is_some_and(|c| c.is_alphanumeric()) {
            return Err(SubentryError::parse(token, "expected a non-negative integer"));
        }
        digits.parse().map_err(|_| SubentryError::parse(token, "integer out of range"))
    }

    fn exclusions(
        &mut self,
        chop_before: &mut Vec<Dn>,
        chop_after: &mut Vec<Dn>,
    ) -> SubentryResult<()> {
        self.expect('{')?;
        if self.eat('}') {
            return Ok(());
        }
        loop {
            let word = self.keyword()?;
            let target = if word.eq_ignore_ascii_case(KW_CHOP_BEFORE) {
                &mut *chop_before
            } else if word.eq_ignore_ascii_case(KW_CHOP_AFTER) {
                &mut *chop_after
            } else {
                return Err(SubentryError::parse(&word, "expected chopBefore or chopAfter"));
            };
            self.expect(':')?;
            target.push(self.quoted_dn()?);

            if self.eat(',') {
                continue;
            }
            return self.expect('}');
        }
    }
}
