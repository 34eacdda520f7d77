//! Response normalizer — provider payload in, canonical [`Bar`] out.
//!
//! Four gates, in order:
//! 1. structural parse into a [`Table`] (`unparseable` on failure)
//! 2. header canonicalization against the source's synonym table
//! 3. row selection: exact date, or for `latest` the maximum date no later
//!    than the request window end
//! 4. type coercion: bad optional fields become `None`, a bad close rejects
//!
//! Range sanity (`low <= close <= high`) is logged, never enforced.

use super::schema::ColumnMap;
use super::source::{FetchRequest, Source};
use crate::calendar::Target;
use crate::domain::{Bar, FetchOutcome};
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Provider payload before any schema is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Delimited text with a header row.
    Csv(String),
    /// One member of a bulk archive; the body is delimited text.
    ArchiveEntry { name: String, body: String },
    /// JSON text: array of row objects or object of column arrays.
    Json(String),
    /// Already tabular (split out of a batch response or decoded envelope).
    Table(Table),
}

/// Header row plus string cells; `None` marks an absent or null cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Why a payload produced no bar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed: {0}")]
    Malformed(String),
    #[error("not found")]
    NotFound,
}

impl Rejection {
    fn malformed(reason: &str) -> Self {
        Rejection::Malformed(reason.to_string())
    }
}

impl From<Rejection> for FetchOutcome {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Malformed(reason) => FetchOutcome::Malformed(reason),
            Rejection::NotFound => FetchOutcome::NotFound,
        }
    }
}

pub const UNPARSEABLE: &str = "unparseable";
pub const MISSING_REQUIRED_FIELD: &str = "missing required field";
pub const UNPARSEABLE_CLOSE: &str = "unparseable close";

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse delimited text. Ragged rows are padded with `None`.
    pub fn from_csv(text: &str) -> Result<Self, Rejection> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|_| Rejection::malformed(UNPARSEABLE))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(Rejection::malformed(UNPARSEABLE));
        }

        let mut table = Table::new(headers);
        for record in reader.records() {
            let record = record.map_err(|_| Rejection::malformed(UNPARSEABLE))?;
            let row = (0..table.headers.len())
                .map(|i| record.get(i).filter(|s| !s.is_empty()).map(str::to_string))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Parse JSON text into a table.
    pub fn from_json_text(text: &str) -> Result<Self, Rejection> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| Rejection::malformed(UNPARSEABLE))?;
        Self::from_json(&value)
    }

    /// Array of row objects, or an object whose values are equal-purpose
    /// column arrays.
    pub fn from_json(value: &Value) -> Result<Self, Rejection> {
        match value {
            Value::Array(rows) => {
                let mut table = Table::default();
                for row in rows {
                    let Value::Object(obj) = row else {
                        return Err(Rejection::malformed(UNPARSEABLE));
                    };
                    for key in obj.keys() {
                        if !table.headers.contains(key) {
                            table.headers.push(key.clone());
                        }
                    }
                }
                for row in rows {
                    if let Value::Object(obj) = row {
                        let cells = table
                            .headers
                            .iter()
                            .map(|h| obj.get(h).and_then(json_cell))
                            .collect();
                        table.rows.push(cells);
                    }
                }
                Ok(table)
            }
            Value::Object(columns) if columns.values().all(Value::is_array) && !columns.is_empty() => {
                let headers: Vec<String> = columns.keys().cloned().collect();
                let len = columns
                    .values()
                    .filter_map(Value::as_array)
                    .map(Vec::len)
                    .max()
                    .unwrap_or(0);
                let mut table = Table::new(headers);
                for i in 0..len {
                    let row = columns
                        .values()
                        .map(|col| col.as_array().and_then(|c| c.get(i)).and_then(json_cell))
                        .collect();
                    table.rows.push(row);
                }
                Ok(table)
            }
            _ => Err(Rejection::malformed(UNPARSEABLE)),
        }
    }

    /// Split rows by the value in `column`, keyed by the uppercased cell.
    pub fn partition_by(&self, column: usize) -> BTreeMap<String, Table> {
        let mut out: BTreeMap<String, Table> = BTreeMap::new();
        for row in &self.rows {
            let Some(key) = row.get(column).and_then(|c| c.as_deref()) else {
                continue;
            };
            out.entry(key.trim().to_uppercase())
                .or_insert_with(|| Table::new(self.headers.clone()))
                .rows
                .push(row.clone());
        }
        out
    }
}

fn json_cell(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// ── Coercion ─────────────────────────────────────────────────────────

/// Cell spellings providers use for "no value".
const NULL_MARKERS: &[&str] = &["", "null", "nan", "n/a", "n/d", "na", "-", "none"];

fn is_null_marker(s: &str) -> bool {
    let s = s.trim();
    NULL_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m))
}

/// Finite float, or `None`.
pub fn parse_number(cell: Option<&str>) -> Option<f64> {
    let s = cell?.trim();
    if is_null_marker(s) {
        return None;
    }
    s.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Non-negative whole volume. Fractional and exponent forms are rounded.
pub fn parse_volume(cell: Option<&str>) -> Option<u64> {
    let v = parse_number(cell)?;
    if v < 0.0 || v > u64::MAX as f64 {
        return None;
    }
    Some(v.round() as u64)
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `MM/DD/YYYY`, an ISO datetime (date part
/// used), or unix seconds / milliseconds.
pub fn parse_date(cell: Option<&str>) -> Option<NaiveDate> {
    let s = cell?.trim();
    if is_null_marker(s) {
        return None;
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        let secs = if n > 100_000_000_000 { n / 1000 } else { n };
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc().date());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(d);
    }
    // Datetime forms: keep the calendar date as written.
    s.get(..10)
        .filter(|_| s.len() > 10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

// ── Gates ────────────────────────────────────────────────────────────

fn structural_parse(payload: &RawPayload) -> Result<Table, Rejection> {
    match payload {
        RawPayload::Csv(text) => Table::from_csv(text),
        RawPayload::ArchiveEntry { body, .. } => Table::from_csv(body),
        RawPayload::Json(text) => Table::from_json_text(text),
        RawPayload::Table(table) => Ok(table.clone()),
    }
}

fn cell(row: &[Option<String>], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| row.get(i)).and_then(|c| c.as_deref())
}

/// A row with a date but no value in any price/volume column (holiday
/// placeholders in chart responses).
fn is_placeholder(row: &[Option<String>], map: &ColumnMap) -> bool {
    [Some(map.close), map.open, map.high, map.low, map.volume]
        .into_iter()
        .all(|idx| cell(row, idx).map_or(true, is_null_marker))
}

fn select_row<'t>(
    table: &'t Table,
    map: &ColumnMap,
    request: &FetchRequest,
) -> Option<(NaiveDate, &'t [Option<String>])> {
    let mut best: Option<(NaiveDate, &[Option<String>])> = None;
    for row in &table.rows {
        let Some(date) = parse_date(cell(row, Some(map.date))) else {
            continue;
        };
        if is_placeholder(row, map) {
            continue;
        }
        let wanted = match request.target {
            Target::Date(d) => date == d,
            // Rows past the last completed trading day are still in progress.
            Target::Latest => {
                date <= request.window.to && best.map_or(true, |(b, _)| date >= b)
            }
        };
        if wanted {
            best = Some((date, row.as_slice()));
        }
    }
    best
}

/// Run a payload through all four gates.
pub fn normalize(
    payload: &RawPayload,
    source: &Source,
    request: &FetchRequest,
) -> Result<Bar, Rejection> {
    let table = structural_parse(payload)?;
    // No rows at all (`[]`, header-only CSV) is "no data", whatever the headers.
    if table.is_empty() {
        return Err(Rejection::NotFound);
    }

    let map = source
        .schema
        .resolve(&table.headers)
        .map_err(|_| Rejection::malformed(MISSING_REQUIRED_FIELD))?;

    let (date, row) = select_row(&table, &map, request).ok_or(Rejection::NotFound)?;

    let close = parse_number(cell(row, Some(map.close)))
        .ok_or_else(|| Rejection::malformed(UNPARSEABLE_CLOSE))?;

    let bar = Bar {
        date,
        open: parse_number(cell(row, map.open)),
        high: parse_number(cell(row, map.high)),
        low: parse_number(cell(row, map.low)),
        close,
        volume: parse_volume(cell(row, map.volume)),
    };

    if !bar.is_sane() {
        debug!(source = %source.name, date = %bar.date, "bar fails OHLC range check; accepted as-is");
    }
    Ok(bar)
}
