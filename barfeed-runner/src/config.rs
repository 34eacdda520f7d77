//! Run configuration, loaded once from TOML and passed into the pipeline.

use barfeed_core::calendar::Target;
use barfeed_core::data::backoff::BackoffPolicy;
use barfeed_core::data::circuit_breaker::BreakerConfig;
use barfeed_core::data::source::{AccessMode, PayloadFormat, Source, SymbolCase, SymbolStyle};
use barfeed_core::data::transport::DEFAULT_USER_AGENT;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything one run needs, constructed once at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Newline-delimited raw tickers.
    pub tickers_file: PathBuf,

    /// Directory holding the previous run's artifacts and receiving this run's.
    pub output_dir: PathBuf,

    /// Historical date to resolve (`"YYYY-MM-DD"`); absent means latest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<NaiveDate>,

    /// Fewer resolved symbols (fresh or carried) than this signals an outage.
    pub min_resolved: usize,

    /// Concurrent batches per source pass.
    pub workers: usize,

    /// Politeness pause each worker takes after a call.
    pub inter_batch_delay_ms: u64,

    /// Run-level deadline; attempts after it fail as transient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,

    pub http: HttpConfig,

    pub retry: RetryConfig,

    pub breaker: BreakerConfig,

    /// Fallback chain, tried in order.
    pub sources: Vec<Source>,
}

/// Shared HTTP session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-source retry policy for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per source before advancing, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

fn stooq_style() -> SymbolStyle {
    SymbolStyle {
        case: SymbolCase::Lower,
        separator: "-".into(),
        suffix: ".us".into(),
    }
}

/// Default fallback chain: a bulk quote batch, then two per-symbol history
/// endpoints with different shapes.
pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new(
            "stooq-quotes",
            AccessMode::BulkBatch,
            "https://stooq.com/q/l/?s={symbols}&f=sd2t2ohlcv&h&e=csv",
        )
        .with_batch_size(100)
        .with_symbols(stooq_style()),
        Source::new(
            "yahoo-chart",
            AccessMode::PerSymbol,
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={period1}&period2={period2}&interval=1d&includeAdjustedClose=true",
        )
        .with_format(PayloadFormat::Chart),
        Source::new(
            "stooq-daily",
            AccessMode::PerSymbol,
            "https://stooq.com/q/d/l/?s={symbol}&d1={from}&d2={to}&i=d",
        )
        .with_symbols(stooq_style()),
    ]
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tickers_file: PathBuf::from("tickers.txt"),
            output_dir: PathBuf::from("data"),
            target: None,
            min_resolved: 9,
            workers: 4,
            inter_batch_delay_ms: 250,
            deadline_secs: None,
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            sources: default_sources(),
        }
    }
}

impl RunConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string. Omitted fields take defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn target(&self) -> Target {
        self.target.map_or(Target::Latest, Target::Date)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.sources.is_empty() {
            return invalid("no sources configured".into());
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1".into());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return invalid("source with empty name".into());
            }
            if !names.insert(source.name.as_str()) {
                return invalid(format!("duplicate source name '{}'", source.name));
            }
            if source.endpoint.trim().is_empty() {
                return invalid(format!("source '{}' has no endpoint", source.name));
            }
            if source.mode == AccessMode::BulkBatch && source.batch_size == 0 {
                return invalid(format!("source '{}' has batch_size 0", source.name));
            }
            if source.format == PayloadFormat::Chart && source.mode != AccessMode::PerSymbol {
                return invalid(format!(
                    "source '{}': chart format requires per-symbol mode",
                    source.name
                ));
            }
        }
        Ok(())
    }
}
