//! Address pattern compilation and matching.
//!
//! Patterns are regular expressions matched against the whole recipient
//! address. Named groups (`(?P<to>...)`) become the captures handed to the
//! handler. A pattern may also use the `(name)` shorthand, which expands to
//! `(?P<name>regex)` using a table of per-name defaults.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::error::PatternError;

/// Named capture values from a successful match, ordered by group name.
pub type Captures = BTreeMap<String, String>;

/// A compiled recipient address pattern.
#[derive(Debug, Clone)]
pub struct AddressPattern {
    source: String,
    regex: Regex,
}

impl AddressPattern {
    /// Compile a pattern. The match is anchored at both ends regardless of
    /// whether the source carries its own `^`/`$`.
    pub fn new(source: impl Into<String>) -> Result<Self, PatternError> {
        let source = source.into();
        let anchored = format!("^(?:{})$", source);

        let regex = Regex::new(&anchored).map_err(|source_err| PatternError {
            pattern: source.clone(),
            source: source_err,
        })?;

        Ok(Self { source, regex })
    }

    /// Expand `(name)` placeholders from `defaults`, then compile.
    ///
    /// `"(to)@(host)"` with `to = ".+"` becomes `"(?P<to>.+)@(?P<host>.+)"`.
    /// Placeholders without a default are left as plain groups.
    pub fn with_defaults(
        template: &str,
        defaults: &BTreeMap<String, String>,
    ) -> Result<Self, PatternError> {
        Self::new(expand_placeholders(template, defaults))
    }

    /// The pattern source as registered (after placeholder expansion).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a full address, returning its named captures.
    pub fn matches(&self, address: &str) -> Option<Captures> {
        let caps = self.regex.captures(address)?;

        let captures = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();

        Some(captures)
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for AddressPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for AddressPattern {}

fn expand_placeholders(template: &str, defaults: &BTreeMap<String, String>) -> String {
    if defaults.is_empty() {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('(') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match (after[name_len..].starts_with(')'), defaults.get(name)) {
            (true, Some(regex)) if !name.is_empty() => {
                out.push_str(&format!("(?P<{}>{})", name, regex));
                rest = &after[name_len + 1..];
            }
            _ => {
                out.push('(');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
