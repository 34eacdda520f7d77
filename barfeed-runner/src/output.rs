//! Output assembler — deterministic artifacts from the reconciled state.
//!
//! Layout inside the output directory:
//! - `latest.json`: snapshot rows sorted by symbol
//! - `latest.csv`: the same rows as CSV
//! - `bad_symbols.txt`: `SYMBOL<TAB>reason` per line, rewritten every run
//! - `manifest.json`: `{"dates": [...]}`, the union across runs
//! - `archive/YYYY-MM-DD.json`: `{date, count, rows}` for dated runs
//!
//! Assembly is pure; [`write_artifacts`] persists every file via
//! write-to-temp-then-rename, `latest.json` last.

use crate::reconcile::BadSymbolLog;
use crate::snapshot::{Snapshot, SnapshotEntry};
use barfeed_core::calendar::Target;
use barfeed_core::domain::Symbol;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Decimal places for every price field.
pub const PRICE_DECIMALS: u32 = 2;

/// Errors while rendering or persisting artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization: {0}")]
    Csv(#[from] csv::Error),
}

/// File locations under one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    root: PathBuf,
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn latest_json(&self) -> PathBuf {
        self.root.join("latest.json")
    }

    pub fn latest_csv(&self) -> PathBuf {
        self.root.join("latest.csv")
    }

    pub fn bad_symbols(&self) -> PathBuf {
        self.root.join("bad_symbols.txt")
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn archive(&self, date: NaiveDate) -> PathBuf {
        self.archive_dir().join(format!("{date}.json"))
    }
}

// ── Manifest ─────────────────────────────────────────────────────────

/// Dated archives produced so far. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub dates: BTreeSet<NaiveDate>,
}

impl Manifest {
    /// Prior manifest, unioned with any archive files on disk so a lost or
    /// corrupt manifest never forgets a date.
    pub fn load(paths: &OutputPaths) -> Self {
        let mut manifest = match fs::read_to_string(paths.manifest()) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(error = %e, "manifest unparseable; rebuilding from archive directory");
                Manifest::default()
            }),
            Err(_) => Manifest::default(),
        };

        if let Ok(dir) = fs::read_dir(paths.archive_dir()) {
            for entry in dir.flatten() {
                let name = entry.file_name();
                let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                    continue;
                };
                if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                    manifest.dates.insert(date);
                }
            }
        }
        manifest
    }

    pub fn with(mut self, date: NaiveDate) -> Self {
        self.dates.insert(date);
        self
    }
}

// ── Assembly ─────────────────────────────────────────────────────────

/// One output row: every field present, prices rounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
    pub fresh: bool,
}

impl OutputRow {
    pub fn new(symbol: &Symbol, entry: &SnapshotEntry) -> Self {
        let bar = entry.bar.rounded(PRICE_DECIMALS);
        Self {
            symbol: symbol.to_string(),
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            fresh: entry.fresh,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArchiveDoc<'a> {
    date: NaiveDate,
    count: usize,
    rows: &'a [OutputRow],
}

/// Rendered file contents, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub latest_json: String,
    pub latest_csv: String,
    pub bad_symbols: String,
    pub manifest: String,
    /// Present for dated runs with at least one fresh bar on that date.
    pub archive: Option<(NaiveDate, String)>,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, OutputError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

fn to_csv(rows: &[OutputRow]) -> Result<String, OutputError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(["symbol", "date", "open", "high", "low", "close", "volume", "fresh"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| OutputError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn bad_symbols_text(bad: &BadSymbolLog) -> String {
    bad.iter()
        .map(|(symbol, reason)| {
            let reason = reason.replace(['\t', '\n', '\r'], " ");
            format!("{symbol}\t{reason}\n")
        })
        .collect()
}

/// Render every artifact from the final state.
pub fn assemble(
    snapshot: &Snapshot,
    bad: &BadSymbolLog,
    target: Target,
    prior_manifest: Manifest,
) -> Result<Artifacts, OutputError> {
    let rows: Vec<OutputRow> = snapshot
        .iter()
        .map(|(symbol, entry)| OutputRow::new(symbol, entry))
        .collect();

    let archive = match target {
        Target::Date(date) => {
            let dated: Vec<OutputRow> = rows
                .iter()
                .filter(|r| r.fresh && r.date == date)
                .cloned()
                .collect();
            if dated.is_empty() {
                debug!(%date, "no fresh bars for target date; archive not written");
                None
            } else {
                let doc = ArchiveDoc {
                    date,
                    count: dated.len(),
                    rows: &dated,
                };
                Some((date, to_json(&doc)?))
            }
        }
        Target::Latest => None,
    };

    let manifest = match &archive {
        Some((date, _)) => prior_manifest.with(*date),
        None => prior_manifest,
    };

    Ok(Artifacts {
        latest_json: to_json(&rows)?,
        latest_csv: to_csv(&rows)?,
        bad_symbols: bad_symbols_text(bad),
        manifest: to_json(&manifest)?,
        archive,
    })
}

// ── Persistence ──────────────────────────────────────────────────────

/// Write `contents` to `path` atomically: write a sibling `.tmp`, then rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(e)
    })
}

/// Persist all artifacts. `latest.json` goes last so it is only replaced once
/// everything else is on disk.
pub fn write_artifacts(paths: &OutputPaths, artifacts: &Artifacts) -> Result<(), OutputError> {
    if let Some((date, text)) = &artifacts.archive {
        write_atomic(&paths.archive(*date), text.as_bytes())?;
    }
    write_atomic(&paths.manifest(), artifacts.manifest.as_bytes())?;
    write_atomic(&paths.bad_symbols(), artifacts.bad_symbols.as_bytes())?;
    write_atomic(&paths.latest_csv(), artifacts.latest_csv.as_bytes())?;
    write_atomic(&paths.latest_json(), artifacts.latest_json.as_bytes())?;
    debug!(dir = %paths.root().display(), "artifacts written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use barfeed_core::domain::Bar;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn snapshot() -> Snapshot {
        [
            (
                "MSFT",
                Bar {
                    date: d(1),
                    open: Some(390.123),
                    high: None,
                    low: Some(388.0),
                    close: 394.9449,
                    volume: Some(20_000_000),
                },
                true,
            ),
            ("AAPL", Bar::close_only(d(1), 169.3), true),
            ("IBM", Bar::close_only(d(1), 150.0), false),
        ]
        .into_iter()
        .map(|(s, bar, fresh)| (Symbol::normalize(s), SnapshotEntry { bar, fresh }))
        .collect()
    }

    #[test]
    fn latest_json_is_sorted_with_explicit_nulls() {
        let a = assemble(&snapshot(), &BadSymbolLog::new(), Target::Latest, Manifest::default())
            .unwrap();
        let rows: serde_json::Value = serde_json::from_str(&a.latest_json).unwrap();
        let rows = rows.as_array().unwrap();
        let symbols: Vec<&str> = rows.iter().map(|r| r["symbol"].as_str().unwrap()).collect();
        assert_eq!(symbols, ["AAPL", "IBM", "MSFT"]);

        let msft = &rows[2];
        assert!(msft.get("high").unwrap().is_null());
        assert_eq!(msft["open"], 390.12);
        assert_eq!(msft["close"], 394.94);
        assert_eq!(rows[1]["fresh"], false);
        assert!(a.archive.is_none());
    }

    #[test]
    fn csv_mirrors_json_rows() {
        let a = assemble(&snapshot(), &BadSymbolLog::new(), Target::Latest, Manifest::default())
            .unwrap();
        let mut lines = a.latest_csv.lines();
        assert_eq!(
            lines.next(),
            Some("symbol,date,open,high,low,close,volume,fresh")
        );
        assert_eq!(lines.next(), Some("AAPL,2024-05-01,,,,169.3,,true"));
    }

    #[test]
    fn empty_snapshot_still_has_csv_header() {
        let a = assemble(&Snapshot::new(), &BadSymbolLog::new(), Target::Latest, Manifest::default())
            .unwrap();
        assert_eq!(a.latest_json.trim(), "[]");
        assert!(a.latest_csv.starts_with("symbol,date,"));
    }

    #[test]
    fn dated_run_archives_fresh_rows_for_that_date() {
        let a = assemble(&snapshot(), &BadSymbolLog::new(), Target::Date(d(1)), Manifest::default())
            .unwrap();
        let (date, text) = a.archive.unwrap();
        assert_eq!(date, d(1));
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["date"], "2024-05-01");
        assert_eq!(doc["count"], 2);
        assert_eq!(doc["rows"].as_array().unwrap().len(), 2);

        let manifest: Manifest = serde_json::from_str(&a.manifest).unwrap();
        assert!(manifest.dates.contains(&d(1)));
    }

    #[test]
    fn manifest_keeps_prior_dates() {
        let prior = Manifest::default().with(d(2));
        let a = assemble(&snapshot(), &BadSymbolLog::new(), Target::Date(d(1)), prior).unwrap();
        let manifest: Manifest = serde_json::from_str(&a.manifest).unwrap();
        assert_eq!(manifest.dates.into_iter().collect::<Vec<_>>(), [d(1), d(2)]);
    }

    #[test]
    fn bad_symbols_one_per_line() {
        let mut bad = BadSymbolLog::new();
        bad.record(Symbol::normalize("ZZZ"), "not found");
        bad.record(Symbol::normalize("AAA"), "transient: a: HTTP 503\nretry");
        let a = assemble(&Snapshot::new(), &bad, Target::Latest, Manifest::default()).unwrap();
        assert_eq!(
            a.bad_symbols,
            "AAA\ttransient: a: HTTP 503 retry\nZZZ\tnot found\n"
        );
    }

    #[test]
    fn assembly_is_deterministic() {
        let run = || {
            assemble(&snapshot(), &BadSymbolLog::new(), Target::Date(d(1)), Manifest::default())
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("latest.json");
        write_atomic(&path, b"[]\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]\n");
        assert!(!dir.path().join("nested").join("latest.json.tmp").exists());
    }

    #[test]
    fn manifest_load_recovers_dates_from_archive_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path());
        write_atomic(&paths.archive(d(3)), b"{}").unwrap();
        write_atomic(&paths.manifest(), b"garbage").unwrap();
        let manifest = Manifest::load(&paths);
        assert!(manifest.dates.contains(&d(3)));
    }
}
