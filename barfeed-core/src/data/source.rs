//! Source definitions — immutable upstream configuration.
//!
//! A source names one provider endpoint, how it is addressed (one archive per
//! run, one call per batch, one call per symbol), how its payload is encoded,
//! how it spells tickers, and which column synonyms it uses.

use super::schema::ColumnSynonyms;
use crate::calendar::{most_recent_trading_day, Target};
use crate::domain::symbol::{Symbol, CLASS_SEPARATOR};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// How a source is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    /// One large archive per run, any number of lookups served from memory.
    BulkArchive,
    /// One call for a whole batch of symbols.
    BulkBatch,
    /// One call per symbol.
    PerSymbol,
}

/// Payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadFormat {
    /// Delimited text with a header row.
    Csv,
    /// JSON array of row objects, object of column arrays, or (batch only)
    /// an object keyed by ticker.
    JsonRows,
    /// Chart envelope: `chart.result[0]` with `timestamp` and
    /// `indicators.quote[0]` column arrays.
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymbolCase {
    #[default]
    Upper,
    Lower,
}

/// How a provider spells tickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolStyle {
    pub case: SymbolCase,
    /// Replaces the canonical class separator `-`.
    pub separator: String,
    /// Appended verbatim, e.g. `.us`.
    pub suffix: String,
}

impl Default for SymbolStyle {
    fn default() -> Self {
        Self {
            case: SymbolCase::Upper,
            separator: CLASS_SEPARATOR.to_string(),
            suffix: String::new(),
        }
    }
}

impl SymbolStyle {
    /// Provider spelling of a canonical symbol.
    pub fn render(&self, symbol: &Symbol) -> String {
        let base = symbol
            .as_str()
            .replace(CLASS_SEPARATOR, &self.separator);
        let base = match self.case {
            SymbolCase::Upper => base.to_uppercase(),
            SymbolCase::Lower => base.to_lowercase(),
        };
        format!("{base}{}", self.suffix)
    }

    /// Case-insensitive key used to match provider rows back to symbols.
    pub fn match_key(&self, symbol: &Symbol) -> String {
        self.render(symbol).to_uppercase()
    }
}

/// Date window a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Calendar days of history requested when resolving the latest bar.
pub const LATEST_LOOKBACK_DAYS: i64 = 10;

impl FetchWindow {
    /// `as_of` is the run's calendar date, read once at start. `latest` ends
    /// on the most recent completed trading day, never on `as_of` itself.
    pub fn for_target(target: Target, as_of: NaiveDate) -> Self {
        match target {
            Target::Latest => {
                let to = most_recent_trading_day(as_of);
                Self {
                    from: to - Duration::days(LATEST_LOOKBACK_DAYS),
                    to,
                }
            }
            Target::Date(d) => Self { from: d, to: d },
        }
    }

    fn period1(&self) -> i64 {
        self.from
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp())
    }

    fn period2(&self) -> i64 {
        (self.to + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp())
    }
}

/// Everything an adapter needs besides the symbols themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub target: Target,
    pub window: FetchWindow,
}

impl FetchRequest {
    pub fn new(target: Target, as_of: NaiveDate) -> Self {
        Self {
            target,
            window: FetchWindow::for_target(target, as_of),
        }
    }
}

fn default_format() -> PayloadFormat {
    PayloadFormat::Csv
}

fn default_batch_size() -> usize {
    100
}

/// One upstream definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub mode: AccessMode,
    /// Template; see [`Source::render_endpoint`] for placeholders.
    pub endpoint: String,
    #[serde(default = "default_format")]
    pub format: PayloadFormat,
    /// Upper bound on symbols per call for `bulk-batch` sources.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub symbols: SymbolStyle,
    #[serde(default)]
    pub schema: ColumnSynonyms,
}

impl Source {
    pub fn new(name: impl Into<String>, mode: AccessMode, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode,
            endpoint: endpoint.into(),
            format: default_format(),
            batch_size: default_batch_size(),
            symbols: SymbolStyle::default(),
            schema: ColumnSynonyms::default(),
        }
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_symbols(mut self, symbols: SymbolStyle) -> Self {
        self.symbols = symbols;
        self
    }

    /// Largest number of symbols one call may carry.
    pub fn batch_capacity(&self) -> usize {
        match self.mode {
            AccessMode::PerSymbol => 1,
            AccessMode::BulkBatch => self.batch_size.max(1),
            AccessMode::BulkArchive => usize::MAX,
        }
    }

    /// Fill the endpoint template.
    ///
    /// Placeholders: `{symbol}` (first symbol), `{symbols}` (comma-joined),
    /// `{from}`/`{to}` (`YYYYMMDD`), `{period1}`/`{period2}` (unix seconds,
    /// `period2` exclusive).
    pub fn render_endpoint(&self, symbols: &[Symbol], window: &FetchWindow) -> String {
        let rendered: Vec<String> = symbols.iter().map(|s| self.symbols.render(s)).collect();
        self.endpoint
            .replace("{symbols}", &rendered.join(","))
            .replace("{symbol}", rendered.first().map_or("", String::as_str))
            .replace("{from}", &window.from.format("%Y%m%d").to_string())
            .replace("{to}", &window.to.format("%Y%m%d").to_string())
            .replace("{period1}", &window.period1().to_string())
            .replace("{period2}", &window.period2().to_string())
    }
}
