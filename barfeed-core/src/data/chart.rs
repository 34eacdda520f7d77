//! Chart envelope decoding (v8 chart API shape).
//!
//! The chart API wraps columnar quote arrays in `chart.result[0]` and reports
//! unknown tickers through `chart.error`. This module only unwraps the
//! envelope into a [`Table`]; field coercion stays in the normalizer.

use super::normalize::{Table, UNPARSEABLE};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Result of unwrapping one chart response.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartDecode {
    Table(Table),
    NotFound,
    Malformed(String),
}

const HEADERS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

fn num(col: &[Option<f64>], i: usize) -> Option<String> {
    col.get(i).copied().flatten().map(|v| v.to_string())
}

/// Unwrap a chart response body.
pub fn decode_chart(body: &str) -> ChartDecode {
    let resp: ChartResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) => return ChartDecode::Malformed(UNPARSEABLE.into()),
    };

    if let Some(err) = resp.chart.error {
        if err.code.eq_ignore_ascii_case("Not Found") {
            return ChartDecode::NotFound;
        }
        return ChartDecode::Malformed(format!("{}: {}", err.code, err.description));
    }

    let Some(data) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return ChartDecode::NotFound;
    };
    // A valid ticker with no bars in the window has no timestamp array.
    let Some(timestamps) = data.timestamp else {
        return ChartDecode::NotFound;
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut table = Table::new(HEADERS.iter().map(|h| h.to_string()).collect());
    for (i, ts) in timestamps.iter().enumerate() {
        table.rows.push(vec![
            Some(ts.to_string()),
            num(&quote.open, i),
            num(&quote.high, i),
            num(&quote.low, i),
            num(&quote.close, i),
            num(&quote.volume, i),
        ]);
    }
    ChartDecode::Table(table)
}
