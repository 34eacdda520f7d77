//! Symbol — canonical instrument identifier.
//!
//! Raw ticker strings arrive from scrapers, hand-edited files and provider
//! responses in many spellings (`brk.b`, `BRK/B`, ` BRK B `). Everything
//! downstream keys on the canonical form produced by [`Symbol::normalize`]:
//! trimmed, uppercase, class-share separator folded to `-`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Separator between a base ticker and its share class in canonical form.
pub const CLASS_SEPARATOR: char = '-';

/// Separators providers use in place of [`CLASS_SEPARATOR`].
const FOREIGN_SEPARATORS: &[char] = &['.', '/', '_', ' '];

/// Known multi-class tickers that some lists spell with no separator at all.
///
/// Every canonical spelling contains `-`, so no canonical output can collide
/// with an alias key and the table never fires twice.
const ALIASES: &[(&str, &str)] = &[
    ("BRKA", "BRK-A"),
    ("BRKB", "BRK-B"),
    ("BFA", "BF-A"),
    ("BFB", "BF-B"),
    ("LENB", "LEN-B"),
    ("HEIA", "HEI-A"),
];

/// Canonical instrument identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Canonicalize a raw ticker string. Total and idempotent.
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();

        if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == upper) {
            return Self((*canonical).to_string());
        }

        let canonical = upper
            .chars()
            .map(|c| {
                if FOREIGN_SEPARATORS.contains(&c) {
                    CLASS_SEPARATOR
                } else {
                    c
                }
            })
            .collect();
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Remove repeated symbols, keeping the first occurrence of each.
pub fn dedupe<I>(symbols: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = Symbol>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Normalize then dedupe a list of raw ticker strings.
pub fn normalize_all<'a, I>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = &'a str>,
{
    dedupe(raw.into_iter().map(Symbol::normalize))
}
