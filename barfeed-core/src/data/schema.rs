//! Column synonym tables.
//!
//! Every provider names its columns differently (`Close`, `<CLOSE>`, `c`,
//! `last`). A source declares the synonyms it uses once; the response
//! normalizer resolves headers against that table and discards the provider
//! names afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical bar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl CanonicalField {
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Open => "open",
            CanonicalField::High => "high",
            CanonicalField::Low => "low",
            CanonicalField::Close => "close",
            CanonicalField::Volume => "volume",
        }
    }
}

/// Header comparison key: lowercase with all whitespace removed.
pub fn header_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Recognized column names per canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSynonyms {
    pub symbol: Vec<String>,
    pub date: Vec<String>,
    pub open: Vec<String>,
    pub high: Vec<String>,
    pub low: Vec<String>,
    pub close: Vec<String>,
    pub volume: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnSynonyms {
    fn default() -> Self {
        Self {
            symbol: names(&["symbol", "ticker", "<ticker>", "code"]),
            date: names(&["date", "<date>", "timestamp", "datetime", "trade_date"]),
            open: names(&["open", "<open>", "o"]),
            high: names(&["high", "<high>", "h"]),
            low: names(&["low", "<low>", "l"]),
            close: names(&["close", "<close>", "c", "last", "price"]),
            volume: names(&["volume", "<vol>", "vol", "v"]),
        }
    }
}

/// Column positions resolved for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub close: usize,
    pub open: Option<usize>,
    pub high: Option<usize>,
    pub low: Option<usize>,
    pub volume: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
}

impl ColumnSynonyms {
    pub fn synonyms(&self, field: CanonicalField) -> &[String] {
        match field {
            CanonicalField::Date => &self.date,
            CanonicalField::Open => &self.open,
            CanonicalField::High => &self.high,
            CanonicalField::Low => &self.low,
            CanonicalField::Close => &self.close,
            CanonicalField::Volume => &self.volume,
        }
    }

    fn position(list: &[String], headers: &[String]) -> Option<usize> {
        let wanted: Vec<String> = list.iter().map(|s| header_key(s)).collect();
        headers
            .iter()
            .position(|h| wanted.contains(&header_key(h)))
    }

    /// First header matching any synonym of `field`.
    pub fn find(&self, field: CanonicalField, headers: &[String]) -> Option<usize> {
        Self::position(self.synonyms(field), headers)
    }

    /// Column holding the instrument identifier, for multi-symbol payloads.
    pub fn symbol_column(&self, headers: &[String]) -> Option<usize> {
        Self::position(&self.symbol, headers)
    }

    /// Map headers to canonical fields. Fails if `date` or `close` is absent.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnMap, SchemaError> {
        let required = |field: CanonicalField| {
            self.find(field, headers)
                .ok_or(SchemaError::MissingColumn(field.name()))
        };
        Ok(ColumnMap {
            date: required(CanonicalField::Date)?,
            close: required(CanonicalField::Close)?,
            open: self.find(CanonicalField::Open, headers),
            high: self.find(CanonicalField::High, headers),
            low: self.find(CanonicalField::Low, headers),
            volume: self.find(CanonicalField::Volume, headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        names(list)
    }

    #[test]
    fn header_key_ignores_case_and_whitespace() {
        assert_eq!(header_key(" Adj Close "), "adjclose");
        assert_eq!(header_key("<CLOSE>"), "<close>");
    }

    #[test]
    fn resolves_plain_headers() {
        let map = ColumnSynonyms::default()
            .resolve(&headers(&["Date", "Open", "High", "Low", "Close", "Volume"]))
            .unwrap();
        assert_eq!(map.date, 0);
        assert_eq!(map.close, 4);
        assert_eq!(map.volume, Some(5));
    }

    #[test]
    fn resolves_bracketed_archive_headers() {
        let map = ColumnSynonyms::default()
            .resolve(&headers(&[
                "<TICKER>", "<PER>", "<DATE>", "<TIME>", "<OPEN>", "<HIGH>", "<LOW>",
                "<CLOSE>", "<VOL>", "<OPENINT>",
            ]))
            .unwrap();
        assert_eq!(map.date, 2);
        assert_eq!(map.open, Some(4));
        assert_eq!(map.close, 7);
        assert_eq!(map.volume, Some(8));
    }

    #[test]
    fn adjusted_close_is_not_close() {
        let map = ColumnSynonyms::default()
            .resolve(&headers(&["date", "adj close", "close"]))
            .unwrap();
        assert_eq!(map.close, 2);
    }

    #[test]
    fn missing_close_is_rejected() {
        let err = ColumnSynonyms::default()
            .resolve(&headers(&["date", "open"]))
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingColumn("close"));
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let map = ColumnSynonyms::default()
            .resolve(&headers(&["timestamp", "price"]))
            .unwrap();
        assert_eq!(map.open, None);
        assert_eq!(map.volume, None);
    }

    #[test]
    fn finds_symbol_column() {
        let syn = ColumnSynonyms::default();
        assert_eq!(syn.symbol_column(&headers(&["Symbol", "Date"])), Some(0));
        assert_eq!(syn.symbol_column(&headers(&["Date"])), None);
    }

    #[test]
    fn partial_override_keeps_defaults_for_other_fields() {
        let syn: ColumnSynonyms = serde_json::from_str(r#"{"close": ["settle"]}"#).unwrap();
        assert_eq!(syn.close, vec!["settle".to_string()]);
        assert_eq!(syn.date, ColumnSynonyms::default().date);
    }
}
