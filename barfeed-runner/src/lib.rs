//! Barfeed Runner — fetch orchestration, reconciliation, artifact output.
//!
//! This crate builds on `barfeed-core` to provide:
//! - Run configuration loaded from TOML
//! - Fallback orchestration across source adapters with retry and backoff
//! - Reconciliation against the previous snapshot (carry-forward, bad-symbol log)
//! - Artifact assembly: latest snapshot, dated archive, manifest
//! - The end-to-end pipeline tying these together

pub mod config;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod snapshot;
pub mod tickers;

pub use config::{ConfigError, HttpConfig, RetryConfig, RunConfig};
pub use orchestrator::{FallbackOrchestrator, FetchReport, OrchestratorOptions};
pub use output::{
    assemble, write_artifacts, Artifacts, Manifest, OutputError, OutputPaths, OutputRow,
};
pub use pipeline::{run_pipeline, PipelineError, RunReport};
pub use progress::{FetchProgress, LogProgress, NoProgress};
pub use reconcile::{reconcile, BadSymbolLog, Reconciliation};
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotRecord};
pub use tickers::{parse_ticker_list, read_ticker_file, TickerError};
