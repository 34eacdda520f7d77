//! Source adapter trait and structured error types.
//!
//! The SourceAdapter trait abstracts over upstream access modes (bulk
//! archive, bulk batch, per-symbol) so the fallback orchestrator can drive
//! any ordered chain of them, and tests can substitute in-memory doubles.

use super::normalize::RawPayload;
use super::source::{FetchRequest, Source};
use crate::domain::Symbol;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Adapter-level failure. Every variant is transient: the orchestrator
/// retries the same source, then moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("payload looks like an error page, not data")]
    ErrorPage,

    #[error("circuit breaker open: provider has blocked requests")]
    CircuitOpen,

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("archive error: {0}")]
    Archive(String),
}

impl AdapterError {
    /// Minimum wait the provider asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdapterError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// What an adapter found for one requested symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Raw data for the normalizer.
    Payload(RawPayload),
    /// The provider answered but has nothing under this key.
    NotFound,
    /// The provider answered with something that cannot be attributed to
    /// the symbol (e.g. a batch body without a ticker column).
    Malformed(String),
}

/// Per-symbol results of one adapter call. Requested symbols missing from
/// the map are treated as [`Lookup::NotFound`].
pub type Lookups = BTreeMap<Symbol, Lookup>;

/// One upstream, addressed according to its access mode.
pub trait SourceAdapter: Send + Sync {
    /// Immutable definition this adapter serves.
    fn source(&self) -> &Source;

    fn name(&self) -> &str {
        &self.source().name
    }

    /// Largest number of symbols [`SourceAdapter::fetch`] accepts per call.
    fn batch_capacity(&self) -> usize {
        self.source().batch_capacity()
    }

    /// Fetch raw payloads for up to [`SourceAdapter::batch_capacity`] symbols.
    ///
    /// `Err` means the call as a whole failed; a symbol absent from an
    /// otherwise valid response is a normal `NotFound`, never an error.
    fn fetch(&self, symbols: &[Symbol], request: &FetchRequest) -> Result<Lookups, AdapterError>;

    /// False once the provider has blocked us (circuit breaker open).
    fn is_available(&self) -> bool {
        true
    }
}
