//! Pipeline entry point: fetch, reconcile, assemble, persist.
//!
//! One logical pass per run:
//! 1. load the prior snapshot (missing or unreadable → empty)
//! 2. resolve every symbol through the fallback chain
//! 3. stop if no source answered at all (previous artifacts stay intact)
//! 4. reconcile outcomes against the prior snapshot
//! 5. render and atomically write every artifact

use crate::config::RunConfig;
use crate::orchestrator::{FallbackOrchestrator, OrchestratorOptions};
use crate::output::{assemble, write_artifacts, Manifest, OutputError, OutputPaths};
use crate::progress::FetchProgress;
use crate::reconcile::reconcile;
use crate::snapshot::Snapshot;
use crate::tickers::TickerError;
use barfeed_core::calendar::Target;
use barfeed_core::data::provider::SourceAdapter;
use barfeed_core::data::source::FetchRequest;
use barfeed_core::domain::Symbol;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Run-level failures. Per-symbol problems never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "systemic failure: no source answered any request ({failed_calls} failed calls); \
         previous artifacts left intact"
    )]
    SystemicFailure { failed_calls: usize },

    #[error("no symbols to fetch")]
    NoSymbols,

    #[error(transparent)]
    Input(#[from] TickerError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// What one run did, for the summary line and exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub target: Target,
    pub requested: usize,
    pub fresh: usize,
    pub carried: usize,
    pub bad: usize,
    /// Prior snapshot entries for symbols no longer requested.
    pub dropped: usize,
    /// Fresh bars older than the expected trading day (latest runs only).
    pub lagging: usize,
    pub min_resolved: usize,
    /// Date of the archive written, if any.
    pub archived: Option<NaiveDate>,
    /// Fresh bars per source name.
    pub resolved_by: BTreeMap<String, usize>,
}

impl RunReport {
    pub fn resolved(&self) -> usize {
        self.fresh + self.carried
    }

    /// Too few usable bars: treat as an upstream outage.
    pub fn below_threshold(&self) -> bool {
        self.resolved() < self.min_resolved
    }

    pub fn summary_line(&self) -> String {
        format!(
            "resolved {} (fresh {}, carried {}); bad {}",
            self.resolved(),
            self.fresh,
            self.carried,
            self.bad
        )
    }
}

/// Run the full pipeline over `symbols` with the given source chain.
///
/// `as_of` is the run's calendar date, read once by the caller.
pub fn run_pipeline(
    config: &RunConfig,
    symbols: &[Symbol],
    adapters: Vec<Box<dyn SourceAdapter>>,
    as_of: NaiveDate,
    progress: &dyn FetchProgress,
) -> Result<RunReport, PipelineError> {
    if symbols.is_empty() {
        return Err(PipelineError::NoSymbols);
    }

    let started = Instant::now();
    let target = config.target();
    let request = FetchRequest::new(target, as_of);
    let expected = request.window.to;
    info!(
        %target,
        %expected,
        symbols = symbols.len(),
        sources = adapters.len(),
        "run started"
    );

    let paths = OutputPaths::new(&config.output_dir);
    let prior = Snapshot::load(&paths.latest_json());

    let orchestrator =
        FallbackOrchestrator::new(adapters, OrchestratorOptions::from_config(config, started));
    let fetch = orchestrator.run(symbols, &request, progress);

    if fetch.is_systemic_failure() {
        error!(
            failed_calls = fetch.failed_calls,
            "no source answered; leaving previous artifacts untouched"
        );
        return Err(PipelineError::SystemicFailure {
            failed_calls: fetch.failed_calls,
        });
    }

    let reconciled = reconcile(&prior, symbols, &fetch.outcomes);

    let lagging = match target {
        Target::Latest => reconciled
            .snapshot
            .iter()
            .filter(|(_, e)| e.fresh && e.bar.date < expected)
            .count(),
        Target::Date(_) => 0,
    };
    if lagging > 0 {
        warn!(lagging, %expected, "fresh bars older than the expected trading day");
    }
    if reconciled.dropped > 0 {
        info!(dropped = reconciled.dropped, "prior entries for unrequested symbols dropped");
    }

    let artifacts = assemble(
        &reconciled.snapshot,
        &reconciled.bad,
        target,
        Manifest::load(&paths),
    )?;
    write_artifacts(&paths, &artifacts)?;

    let mut resolved_by: BTreeMap<String, usize> = BTreeMap::new();
    for source in fetch.resolved_by.values() {
        *resolved_by.entry(source.clone()).or_default() += 1;
    }

    let report = RunReport {
        target,
        requested: symbols.len(),
        fresh: reconciled.fresh,
        carried: reconciled.carried,
        bad: reconciled.bad.len(),
        dropped: reconciled.dropped,
        lagging,
        min_resolved: config.min_resolved,
        archived: artifacts.archive.as_ref().map(|(d, _)| *d),
        resolved_by,
    };
    info!(
        fetched = report.fresh,
        carried = report.carried,
        bad = report.bad,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run complete"
    );
    if report.below_threshold() {
        warn!(
            resolved = report.resolved(),
            min_resolved = report.min_resolved,
            "resolved count below threshold"
        );
    }
    Ok(report)
}
