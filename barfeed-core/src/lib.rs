//! Barfeed Core — symbols, bars, source adapters, response normalization.
//!
//! This crate contains everything that talks to, or interprets, a provider:
//! - Symbol normalization into the canonical ticker form
//! - Source definitions and the three access modes (archive, batch, per-symbol)
//! - HTTP transport with error-page detection and per-source circuit breakers
//! - The response normalizer that turns any payload into one canonical bar
//!
//! Orchestration, reconciliation and artifact writing live in `barfeed-runner`.

pub mod calendar;
pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with the orchestrator's worker pool
    /// are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Symbol>();
        require_sync::<domain::Symbol>();
        require_send::<domain::FetchOutcome>();
        require_sync::<domain::FetchOutcome>();

        require_send::<data::Source>();
        require_sync::<data::Source>();
        require_send::<data::FetchRequest>();
        require_sync::<data::FetchRequest>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::BulkArchiveAdapter>();
        require_sync::<data::BulkArchiveAdapter>();
        require_send::<data::BulkBatchAdapter>();
        require_sync::<data::BulkBatchAdapter>();
        require_send::<data::PerSymbolAdapter>();
        require_sync::<data::PerSymbolAdapter>();
        require_send::<Box<dyn data::SourceAdapter>>();
        require_sync::<Box<dyn data::SourceAdapter>>();
    }

    /// Adapters can be driven through a trait object.
    #[test]
    fn source_adapter_is_object_safe() {
        fn _takes_dyn(
            adapter: &dyn data::SourceAdapter,
            symbols: &[domain::Symbol],
            request: &data::FetchRequest,
        ) -> Result<data::Lookups, data::AdapterError> {
            adapter.fetch(symbols, request)
        }
    }
}
