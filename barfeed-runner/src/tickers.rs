//! Ticker list input.
//!
//! One ticker per line. Blank lines, `#` comments and a `TICKER`/`SYMBOL`
//! header are skipped; for comma-separated lines only the first field counts,
//! so a one-column CSV export works unchanged.

use barfeed_core::domain::{dedupe, Symbol};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("read ticker file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ticker file {} lists no symbols", path.display())]
    Empty { path: PathBuf },
}

const HEADER_NAMES: &[&str] = &["ticker", "symbol"];

fn first_field(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let field = line.split(',').next()?.trim().trim_matches('"').trim();
    if field.is_empty() || HEADER_NAMES.iter().any(|h| field.eq_ignore_ascii_case(h)) {
        return None;
    }
    Some(field)
}

/// Canonical, de-duplicated symbols in first-seen order.
pub fn parse_ticker_list(text: &str) -> Vec<Symbol> {
    dedupe(
        text.lines()
            .filter_map(first_field)
            .map(Symbol::normalize)
            .filter(|s| !s.is_empty()),
    )
}

/// Read and parse a ticker file. An empty list is an error.
pub fn read_ticker_file(path: &Path) -> Result<Vec<Symbol>, TickerError> {
    let text = std::fs::read_to_string(path).map_err(|source| TickerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let symbols = parse_ticker_list(&text);
    if symbols.is_empty() {
        return Err(TickerError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(symbols)
}
