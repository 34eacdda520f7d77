//! Upstream access: source definitions, transport, adapters, normalization.

pub mod archive;
pub mod backoff;
pub mod batch;
pub mod chart;
pub mod circuit_breaker;
pub mod normalize;
pub mod per_symbol;
pub mod provider;
pub mod schema;
pub mod source;
pub mod transport;

pub use archive::BulkArchiveAdapter;
pub use backoff::BackoffPolicy;
pub use batch::BulkBatchAdapter;
pub use circuit_breaker::{BreakerConfig, CircuitBreaker};
pub use normalize::{normalize, RawPayload, Rejection, Table};
pub use per_symbol::PerSymbolAdapter;
pub use provider::{AdapterError, Lookup, Lookups, SourceAdapter};
pub use schema::{ColumnMap, ColumnSynonyms};
pub use source::{AccessMode, FetchRequest, FetchWindow, PayloadFormat, Source, SymbolStyle};
pub use transport::{HttpResponse, HttpTransport, Transport};

use std::sync::Arc;

/// One adapter per source, in chain order, sharing a transport. Each adapter
/// gets its own circuit breaker.
pub fn build_adapters(
    sources: &[Source],
    transport: Arc<dyn Transport>,
    breaker: &BreakerConfig,
) -> Vec<Box<dyn SourceAdapter>> {
    sources
        .iter()
        .map(|source| -> Box<dyn SourceAdapter> {
            let source = source.clone();
            let transport = Arc::clone(&transport);
            match source.mode {
                AccessMode::BulkArchive => {
                    Box::new(BulkArchiveAdapter::new(source, transport, breaker))
                }
                AccessMode::BulkBatch => Box::new(BulkBatchAdapter::new(source, transport, breaker)),
                AccessMode::PerSymbol => Box::new(PerSymbolAdapter::new(source, transport, breaker)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl Transport for Offline {
        fn get(&self, _url: &str) -> Result<HttpResponse, AdapterError> {
            Err(AdapterError::Network("offline".into()))
        }
    }

    #[test]
    fn builds_one_adapter_per_source_in_order() {
        let sources = vec![
            Source::new("a", AccessMode::BulkArchive, "x"),
            Source::new("b", AccessMode::BulkBatch, "x").with_batch_size(25),
            Source::new("c", AccessMode::PerSymbol, "x"),
        ];
        let adapters = build_adapters(&sources, Arc::new(Offline), &BreakerConfig::default());
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(adapters[1].batch_capacity(), 25);
        assert_eq!(adapters[2].batch_capacity(), 1);
        assert!(adapters.iter().all(|a| a.is_available()));
    }
}
