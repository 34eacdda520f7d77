//! Fallback orchestrator — drives the ordered source chain for every symbol.
//!
//! Each source pass takes only the symbols still unresolved, splits them
//! into batches sized to the source's capacity, and runs the batches on a
//! private rayon pool. Per batch:
//! - adapter error (network, status, error page): retry the same source with
//!   backoff, up to `max_attempts`, then hand the batch to the next source
//! - `Malformed` / `NotFound` for a symbol: next source, no retry
//! - `Fetched`: done, never queried again
//!
//! Results are merged into `BTreeMap`s after each pass, so the order in
//! which batches complete never reaches the output.

use crate::config::RunConfig;
use crate::progress::FetchProgress;
use barfeed_core::data::backoff::BackoffPolicy;
use barfeed_core::data::normalize::normalize;
use barfeed_core::data::provider::{AdapterError, Lookup, SourceAdapter};
use barfeed_core::data::source::FetchRequest;
use barfeed_core::domain::{FetchOutcome, Symbol};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scheduling knobs for one run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Attempts per source per batch, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Concurrent batches; 1 runs on the calling thread.
    pub workers: usize,
    /// Pause after each answered call.
    pub inter_batch_delay: Duration,
    /// No new attempt starts after this instant.
    pub deadline: Option<Instant>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            workers: 1,
            inter_batch_delay: Duration::ZERO,
            deadline: None,
        }
    }
}

impl OrchestratorOptions {
    /// Options from a run config; the deadline counts from `started`.
    pub fn from_config(config: &RunConfig, started: Instant) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            backoff: config.retry.backoff,
            workers: config.workers.max(1),
            inter_batch_delay: config.inter_batch_delay(),
            deadline: config.deadline().map(|d| started + d),
        }
    }
}

/// Everything the orchestrator learned in one run.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Exactly one outcome per requested symbol.
    pub outcomes: BTreeMap<Symbol, FetchOutcome>,
    /// Source name that produced each `Fetched` outcome.
    pub resolved_by: BTreeMap<Symbol, String>,
    /// Adapter calls that returned a response (any content).
    pub answered_calls: usize,
    /// Adapter calls that failed outright, counting every attempt.
    pub failed_calls: usize,
    /// Batches abandoned because the run deadline passed.
    pub deadline_aborts: usize,
}

impl FetchReport {
    /// No source answered a single call: the whole chain was unreachable.
    /// A run cut short by its own deadline is not an outage.
    pub fn is_systemic_failure(&self) -> bool {
        !self.outcomes.is_empty() && self.answered_calls == 0 && self.deadline_aborts == 0
    }

    pub fn fetched(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_fetched()).count()
    }
}

/// Failure history of one symbol across the chain.
#[derive(Debug, Clone, Default)]
struct Trail {
    tried: bool,
    /// Last non-`NotFound` failure, tagged with its source.
    last_failure: Option<FetchOutcome>,
}

impl Trail {
    fn record(&mut self, outcome: FetchOutcome, source: &str) {
        self.tried = true;
        if !matches!(outcome, FetchOutcome::NotFound) {
            self.last_failure = Some(outcome.tagged(source));
        }
    }

    fn exhausted(self) -> FetchOutcome {
        match self.last_failure {
            Some(failure) => failure,
            None if self.tried => FetchOutcome::NotFound,
            None => FetchOutcome::TransientError("no source available".into()),
        }
    }
}

/// Result of one batch against one source.
struct BatchResult {
    outcomes: Vec<(Symbol, FetchOutcome)>,
    answered: bool,
    failed_attempts: usize,
    timed_out: bool,
}

pub struct FallbackOrchestrator {
    adapters: Vec<Box<dyn SourceAdapter>>,
    options: OrchestratorOptions,
    thread_pool: Option<rayon::ThreadPool>,
}

impl FallbackOrchestrator {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, options: OrchestratorOptions) -> Self {
        let thread_pool = if options.workers > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.workers)
                .thread_name(|i| format!("barfeed-fetch-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "could not build worker pool; fetching sequentially");
                    None
                }
            }
        } else {
            None
        };
        Self {
            adapters,
            options,
            thread_pool,
        }
    }

    fn deadline_passed(&self) -> bool {
        self.options.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Sleep for `delay`, but never past the deadline.
    fn pause(&self, delay: Duration) {
        let delay = match self.options.deadline {
            Some(d) => delay.min(d.saturating_duration_since(Instant::now())),
            None => delay,
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    /// Resolve every symbol against the chain.
    pub fn run(
        &self,
        symbols: &[Symbol],
        request: &FetchRequest,
        progress: &dyn FetchProgress,
    ) -> FetchReport {
        let mut report = FetchReport::default();
        let mut trails: BTreeMap<Symbol, Trail> = BTreeMap::new();
        let mut pending: Vec<Symbol> = symbols.to_vec();

        for adapter in &self.adapters {
            if pending.is_empty() {
                break;
            }
            let source = adapter.name().to_string();

            if !adapter.is_available() {
                warn!(source = %source, pending = pending.len(), "circuit breaker open; skipping source");
                for symbol in &pending {
                    trails.entry(symbol.clone()).or_default().record(
                        FetchOutcome::TransientError(AdapterError::CircuitOpen.to_string()),
                        &source,
                    );
                }
                continue;
            }

            progress.on_source_start(&source, pending.len());
            let capacity = adapter.batch_capacity().max(1);
            let batches: Vec<&[Symbol]> = pending.chunks(capacity).collect();

            let results: Vec<BatchResult> = match &self.thread_pool {
                Some(pool) => pool.install(|| {
                    batches
                        .par_iter()
                        .map(|batch| self.run_batch(adapter.as_ref(), batch, request, progress))
                        .collect()
                }),
                None => batches
                    .iter()
                    .map(|batch| self.run_batch(adapter.as_ref(), batch, request, progress))
                    .collect(),
            };

            let mut resolved_here = 0;
            for result in results {
                if result.answered {
                    report.answered_calls += 1;
                }
                report.failed_calls += result.failed_attempts;
                if result.timed_out {
                    report.deadline_aborts += 1;
                }
                for (symbol, outcome) in result.outcomes {
                    if outcome.is_fetched() {
                        resolved_here += 1;
                        report.resolved_by.insert(symbol.clone(), source.clone());
                        report.outcomes.insert(symbol, outcome);
                    } else {
                        trails.entry(symbol).or_default().record(outcome, &source);
                    }
                }
            }

            pending.retain(|s| !report.outcomes.contains_key(s));
            progress.on_source_complete(&source, resolved_here, pending.len());
            info!(
                source = %source,
                resolved = resolved_here,
                remaining = pending.len(),
                "source pass done"
            );
        }

        for symbol in pending {
            let outcome = trails.remove(&symbol).unwrap_or_default().exhausted();
            debug!(%symbol, reason = %outcome.reason(), "exhausted all sources");
            report.outcomes.insert(symbol, outcome);
        }
        report
    }

    /// One batch against one source, with retries for adapter errors.
    fn run_batch(
        &self,
        adapter: &dyn SourceAdapter,
        batch: &[Symbol],
        request: &FetchRequest,
        progress: &dyn FetchProgress,
    ) -> BatchResult {
        let source = adapter.name();
        let mut failed_attempts = 0;
        let mut attempt: u32 = 1;

        let error = loop {
            if self.deadline_passed() {
                break AdapterError::DeadlineExceeded;
            }
            if !adapter.is_available() {
                break AdapterError::CircuitOpen;
            }

            debug!(source, attempt, batch = batch.len(), "fetching");
            match adapter.fetch(batch, request) {
                Ok(mut lookups) => {
                    let outcomes: Vec<(Symbol, FetchOutcome)> = batch
                        .iter()
                        .map(|symbol| {
                            let outcome = match lookups.remove(symbol) {
                                Some(Lookup::Payload(payload)) => {
                                    match normalize(&payload, adapter.source(), request) {
                                        Ok(bar) => FetchOutcome::Fetched(bar),
                                        Err(rejection) => rejection.into(),
                                    }
                                }
                                Some(Lookup::Malformed(reason)) => FetchOutcome::Malformed(reason),
                                Some(Lookup::NotFound) | None => FetchOutcome::NotFound,
                            };
                            progress.on_symbol_done(symbol, source, outcome.is_fetched());
                            (symbol.clone(), outcome)
                        })
                        .collect();
                    self.pause(self.options.inter_batch_delay);
                    return BatchResult {
                        outcomes,
                        answered: true,
                        failed_attempts,
                        timed_out: false,
                    };
                }
                Err(e) => {
                    failed_attempts += 1;
                    let final_attempt = attempt >= self.options.max_attempts
                        || matches!(e, AdapterError::CircuitOpen | AdapterError::DeadlineExceeded);
                    if final_attempt {
                        break e;
                    }
                    let delay = self.options.backoff.delay_with_hint(attempt, e.retry_after());
                    warn!(
                        source,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure; retrying"
                    );
                    self.pause(delay);
                    attempt += 1;
                }
            }
        };

        warn!(source, attempts = attempt, error = %error, batch = batch.len(), "giving up on source for batch");
        let reason = error.to_string();
        let outcomes = batch
            .iter()
            .map(|symbol| {
                progress.on_symbol_done(symbol, source, false);
                (symbol.clone(), FetchOutcome::TransientError(reason.clone()))
            })
            .collect();
        BatchResult {
            outcomes,
            answered: false,
            failed_attempts,
            timed_out: error == AdapterError::DeadlineExceeded,
        }
    }
}
