/*
    ldif.rs - LDIF content records

    Reads LDIF content (RFC 2849, content records only) into entries.
    Used by the CLI to populate an in-memory store.

    Supported:
    - `#` comments, blank-line record separators, `version:` header
    - folded lines (continuation lines start with one space)
    - `attr: value` and base64 `attr:: value`
*/

use crate::core_dit::dn::{Dn, DnError};
use crate::core_dit::entry::Entry;
use base64::Engine as _;
use thiserror::Error;

/// Errors raised while reading LDIF
#[derive(Debug, Error)]
pub enum LdifError {
    #[error("line {line}: record does not start with dn")]
    MissingDn { line: usize },

    #[error("line {line}: malformed line \"{text}\"")]
    Malformed { line: usize, text: String },

    #[error("line {line}: invalid DN: {source}")]
    InvalidDn {
        line: usize,
        #[source]
        source: DnError,
    },

    #[error("line {line}: invalid base64 value")]
    InvalidBase64 { line: usize },

    #[error("line {line}: unsupported LDIF feature \"{feature}\"")]
    Unsupported { line: usize, feature: String },
}

/// Parse LDIF text into entries, in file order
pub fn parse_ldif(text: &str) -> Result<Vec<Entry>, LdifError> {
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;

    for (line_no, line) in unfold(text) {
        let line = line.trim_end();
        if line.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }

        let (name, value) = parse_line(line_no, line)?;

        let Some(entry) = current.as_mut() else {
            if name.eq_ignore_ascii_case("version") && entries.is_empty() {
                continue;
            }
            if !name.eq_ignore_ascii_case("dn") {
                return Err(LdifError::MissingDn { line: line_no });
            }
            let dn = Dn::parse(&value).map_err(|source| LdifError::InvalidDn {
                line: line_no,
                source,
            })?;
            current = Some(Entry::new(dn));
            continue;
        };

        if name.eq_ignore_ascii_case("changetype") {
            return Err(LdifError::Unsupported {
                line: line_no,
                feature: "changetype".to_string(),
            });
        }
        entry.add_value(&name, value);
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }
    Ok(entries)
}

/// Join folded lines and drop comments. Yields (first line number, text).
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    let mut in_comment = false;

    for (idx, raw) in text.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix(' ') {
            if in_comment {
                continue;
            }
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        in_comment = raw.starts_with('#');
        if in_comment {
            continue;
        }
        lines.push((idx + 1, raw.to_string()));
    }
    lines
}

fn parse_line(line_no: usize, line: &str) -> Result<(String, String), LdifError> {
    let colon = line.find(':').ok_or_else(|| LdifError::Malformed {
        line: line_no,
        text: line.to_string(),
    })?;
    let name = line[..colon].trim().to_string();
    if name.is_empty() {
        return Err(LdifError::Malformed {
            line: line_no,
            text: line.to_string(),
        });
    }
    let rest = &line[colon + 1..];

    if let Some(encoded) = rest.strip_prefix(':') {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| LdifError::InvalidBase64 { line: line_no })?;
        let value =
            String::from_utf8(bytes).map_err(|_| LdifError::InvalidBase64 { line: line_no })?;
        return Ok((name, value));
    }
    if rest.starts_with('<') {
        return Err(LdifError::Unsupported {
            line: line_no,
            feature: "URL value".to_string(),
        });
    }
    Ok((name, rest.trim_start().to_string()))
}
