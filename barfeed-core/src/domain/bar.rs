//! Bar — one trading day's price record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar in canonical field names.
///
/// Only `date` and `close` are guaranteed. Providers routinely omit the
/// other fields (quote endpoints without volume, partial rows), so they are
/// optional rather than NaN-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    /// A bar with only the required fields.
    pub fn close_only(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    /// OHLC range check over whichever fields are present.
    ///
    /// Informational only: schema-valid bars are accepted even when this
    /// returns false.
    pub fn is_sane(&self) -> bool {
        let present: Vec<f64> = [self.open, Some(self.close), self.high, self.low]
            .into_iter()
            .flatten()
            .collect();
        let high_ok = self
            .high
            .map_or(true, |h| present.iter().all(|&v| h >= v));
        let low_ok = self.low.map_or(true, |l| present.iter().all(|&v| l <= v));
        high_ok && low_ok
    }

    /// Copy of this bar with every price rounded to `decimals` places.
    pub fn rounded(&self, decimals: u32) -> Self {
        let round = |v: f64| round_to(v, decimals);
        Self {
            date: self.date,
            open: self.open.map(round),
            high: self.high.map(round),
            low: self.low.map(round),
            close: round(self.close),
            volume: self.volume,
        }
    }
}

/// Round half away from zero to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
