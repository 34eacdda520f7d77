//! Reconciliation engine — merges this run's outcomes into the prior snapshot.
//!
//! Per requested symbol:
//! - `Fetched(bar)` → entry `(bar, fresh)`
//! - anything else, prior entry exists → prior entry kept as-is, `fresh = false`
//! - anything else, no prior entry → bad-symbol log with the outcome's reason
//!
//! Carried bars keep their original date and values; staleness shows only in
//! the freshness flag. The new snapshot is built as a complete value before
//! anything is persisted.

use crate::snapshot::{Snapshot, SnapshotEntry};
use barfeed_core::domain::{FetchOutcome, Symbol};
use std::collections::BTreeMap;
use tracing::debug;

/// Symbols that ended the run with no usable bar, with the reason.
/// Rebuilt from scratch every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadSymbolLog {
    entries: BTreeMap<Symbol, String>,
}

impl BadSymbolLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, symbol: Symbol, reason: impl Into<String>) {
        self.entries.insert(symbol, reason.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn reason(&self, symbol: &Symbol) -> Option<&str> {
        self.entries.get(symbol).map(String::as_str)
    }

    /// Entries in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &str)> {
        self.entries.iter().map(|(s, r)| (s, r.as_str()))
    }
}

/// The new state plus counts for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub snapshot: Snapshot,
    pub bad: BadSymbolLog,
    pub fresh: usize,
    pub carried: usize,
    /// Prior entries for symbols no longer requested.
    pub dropped: usize,
}

impl Reconciliation {
    /// Symbols with a usable bar, fresh or carried.
    pub fn resolved(&self) -> usize {
        self.fresh + self.carried
    }
}

/// Build the next snapshot from the prior one and this run's outcomes.
///
/// A requested symbol with no outcome is treated as a transient failure, so
/// it is carried forward rather than dropped.
pub fn reconcile(
    prior: &Snapshot,
    symbols: &[Symbol],
    outcomes: &BTreeMap<Symbol, FetchOutcome>,
) -> Reconciliation {
    let mut snapshot = Snapshot::new();
    let mut bad = BadSymbolLog::new();
    let mut fresh = 0;
    let mut carried = 0;

    let missing = FetchOutcome::TransientError("no outcome recorded".into());

    for symbol in symbols {
        if snapshot.contains(symbol) || bad.contains(symbol) {
            continue;
        }
        let outcome = outcomes.get(symbol).unwrap_or(&missing);
        match (outcome, prior.get(symbol)) {
            (FetchOutcome::Fetched(bar), _) => {
                snapshot.insert(
                    symbol.clone(),
                    SnapshotEntry {
                        bar: bar.clone(),
                        fresh: true,
                    },
                );
                fresh += 1;
            }
            (failure, Some(previous)) => {
                debug!(%symbol, reason = %failure.reason(), date = %previous.bar.date, "carrying forward");
                snapshot.insert(
                    symbol.clone(),
                    SnapshotEntry {
                        bar: previous.bar.clone(),
                        fresh: false,
                    },
                );
                carried += 1;
            }
            (failure, None) => {
                bad.record(symbol.clone(), failure.reason());
            }
        }
    }

    // A requested symbol with a prior entry always lands in the snapshot.
    let dropped = prior.symbols().filter(|s| !snapshot.contains(s)).count();

    Reconciliation {
        snapshot,
        bad,
        fresh,
        carried,
        dropped,
    }
}
