//! Per-symbol result of one acquisition run.

use super::bar::Bar;

/// What the fallback chain produced for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Bar),
    /// Every source answered, none had data for the key.
    NotFound,
    /// Schema or parse failure. Not retried against the same source.
    Malformed(String),
    /// Network, rate limit, timeout or aborted fetch. Retryable.
    TransientError(String),
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }

    /// Short diagnostic used in the bad-symbol log.
    pub fn reason(&self) -> String {
        match self {
            FetchOutcome::Fetched(_) => "fetched".into(),
            FetchOutcome::NotFound => "not found".into(),
            FetchOutcome::Malformed(r) => format!("malformed: {r}"),
            FetchOutcome::TransientError(r) => format!("transient: {r}"),
        }
    }

    /// Prefix the failure reason with the source that produced it.
    pub fn tagged(self, source: &str) -> Self {
        match self {
            FetchOutcome::Malformed(r) => FetchOutcome::Malformed(format!("{source}: {r}")),
            FetchOutcome::TransientError(r) => {
                FetchOutcome::TransientError(format!("{source}: {r}"))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_readable() {
        assert_eq!(FetchOutcome::NotFound.reason(), "not found");
        assert_eq!(
            FetchOutcome::Malformed("unparseable close".into()).reason(),
            "malformed: unparseable close"
        );
        assert_eq!(
            FetchOutcome::TransientError("HTTP 503".into())
                .tagged("stooq")
                .reason(),
            "transient: stooq: HTTP 503"
        );
    }

    #[test]
    fn tagging_leaves_not_found_alone() {
        assert_eq!(FetchOutcome::NotFound.tagged("x"), FetchOutcome::NotFound);
    }
}
