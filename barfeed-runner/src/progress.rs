//! Progress callbacks for long fetch runs.

use barfeed_core::domain::Symbol;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Callback trait for reporting fetch progress.
///
/// Batches run on a worker pool, so implementations are shared across threads.
pub trait FetchProgress: Send + Sync {
    /// A source pass starts with `pending` unresolved symbols.
    fn on_source_start(&self, source: &str, pending: usize);

    /// One symbol left the pending set for this source (resolved or not).
    fn on_symbol_done(&self, symbol: &Symbol, source: &str, resolved: bool);

    /// A source pass finished.
    fn on_source_complete(&self, source: &str, resolved: usize, remaining: usize);
}

/// Reports nothing.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_source_start(&self, _source: &str, _pending: usize) {}
    fn on_symbol_done(&self, _symbol: &Symbol, _source: &str, _resolved: bool) {}
    fn on_source_complete(&self, _source: &str, _resolved: usize, _remaining: usize) {}
}

/// Logs a line every `every` symbols, plus one per source pass.
pub struct LogProgress {
    every: usize,
    done: AtomicUsize,
    resolved: AtomicUsize,
}

pub const DEFAULT_LOG_EVERY: usize = 25;

impl LogProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            done: AtomicUsize::new(0),
            resolved: AtomicUsize::new(0),
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_EVERY)
    }
}

impl FetchProgress for LogProgress {
    fn on_source_start(&self, source: &str, pending: usize) {
        info!(source, pending, "source pass started");
    }

    fn on_symbol_done(&self, _symbol: &Symbol, source: &str, resolved: bool) {
        let resolved_total = if resolved {
            self.resolved.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.resolved.load(Ordering::Relaxed)
        };
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.every == 0 {
            info!(source, done, resolved = resolved_total, "progress");
        }
    }

    fn on_source_complete(&self, source: &str, resolved: usize, remaining: usize) {
        info!(source, resolved, remaining, "source pass complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_across_sources() {
        let p = LogProgress::new(2);
        let sym = Symbol::normalize("AAPL");
        p.on_symbol_done(&sym, "a", false);
        p.on_symbol_done(&sym, "b", true);
        p.on_symbol_done(&Symbol::normalize("MSFT"), "a", true);
        assert_eq!(p.done(), 3);
        assert_eq!(p.resolved(), 2);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let p = LogProgress::new(0);
        p.on_symbol_done(&Symbol::normalize("A"), "s", true);
        assert_eq!(p.done(), 1);
    }
}
