//! Snapshot — the persisted "latest known good bar" per symbol.
//!
//! Loaded from the previous run's `latest.json` at start. A missing file is a
//! first run; an unreadable one is logged and treated as empty, so a corrupt
//! artifact can never block a new run.

use barfeed_core::domain::{Bar, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// One bar plus whether this run observed it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub bar: Bar,
    /// `false` when carried forward from an earlier run.
    pub fresh: bool,
}

/// Wire form of one snapshot row. Every field is always present; absent
/// values are explicit nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
    pub fresh: bool,
}

impl SnapshotRecord {
    pub fn from_entry(symbol: &Symbol, entry: &SnapshotEntry) -> Self {
        let bar = &entry.bar;
        Self {
            symbol: symbol.clone(),
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            fresh: entry.fresh,
        }
    }

    pub fn into_entry(self) -> (Symbol, SnapshotEntry) {
        let bar = Bar {
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        };
        (
            self.symbol,
            SnapshotEntry {
                bar,
                fresh: self.fresh,
            },
        )
    }
}

/// Symbol → latest known-good bar, iterated in symbol order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<Symbol, SnapshotEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&SnapshotEntry> {
        self.entries.get(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn insert(&mut self, symbol: Symbol, entry: SnapshotEntry) {
        self.entries.insert(symbol, entry);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &SnapshotEntry)> {
        self.entries.iter()
    }

    /// Rows in symbol order.
    pub fn records(&self) -> Vec<SnapshotRecord> {
        self.entries
            .iter()
            .map(|(symbol, entry)| SnapshotRecord::from_entry(symbol, entry))
            .collect()
    }

    /// Parse a persisted snapshot. Rows that do not decode are skipped;
    /// anything other than a JSON array yields an empty snapshot.
    pub fn parse(text: &str) -> Self {
        let rows = match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(rows)) => rows,
            Ok(_) => {
                warn!("prior snapshot is not a JSON array; starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(error = %e, "prior snapshot unparseable; starting empty");
                return Self::new();
            }
        };

        let mut snapshot = Self::new();
        let mut skipped = 0usize;
        for row in rows {
            match serde_json::from_value::<SnapshotRecord>(row) {
                Ok(record) => {
                    let (symbol, entry) = record.into_entry();
                    // Re-canonicalize in case the alias table changed.
                    let symbol = Symbol::normalize(symbol.as_str());
                    if symbol.is_empty() || snapshot.contains(&symbol) {
                        skipped += 1;
                        continue;
                    }
                    snapshot.insert(symbol, entry);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, kept = snapshot.len(), "skipped unreadable prior snapshot rows");
        }
        snapshot
    }

    /// Load the previous run's snapshot, or an empty one.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let snapshot = Self::parse(&text);
                debug!(path = %path.display(), entries = snapshot.len(), "prior snapshot loaded");
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no prior snapshot");
                Self::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "prior snapshot unreadable; starting empty");
                Self::new()
            }
        }
    }
}

impl FromIterator<(Symbol, SnapshotEntry)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (Symbol, SnapshotEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
