//! Retry backoff policy: attempt number in, delay out.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay before retrying the same source.
///
/// `attempt` is the 1-based number of the attempt that just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Retry immediately. Used by tests.
    None,
    /// `step_ms * attempt`, capped at `max_ms`.
    Linear { step_ms: u64, max_ms: u64 },
    /// `base_ms * 2^(attempt-1)`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base_ms: 500,
            max_ms: 8_000,
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let ms = match *self {
            BackoffPolicy::None => 0,
            BackoffPolicy::Linear { step_ms, max_ms } => {
                step_ms.saturating_mul(u64::from(attempt)).min(max_ms)
            }
            BackoffPolicy::Exponential { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }

    /// Upper bound this policy will ever wait.
    pub fn max_delay(&self) -> Duration {
        match *self {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Linear { max_ms, .. } | BackoffPolicy::Exponential { max_ms, .. } => {
                Duration::from_millis(max_ms)
            }
        }
    }

    /// Policy delay, raised to a provider-requested `retry_after` but never
    /// past the policy cap.
    pub fn delay_with_hint(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.delay(attempt);
        match retry_after {
            Some(hint) => base.max(hint.min(self.max_delay())),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_waits() {
        assert_eq!(BackoffPolicy::None.delay(5), Duration::ZERO);
        assert_eq!(
            BackoffPolicy::None.delay_with_hint(1, Some(Duration::from_secs(60))),
            Duration::ZERO
        );
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let p = BackoffPolicy::Exponential {
            base_ms: 500,
            max_ms: 3_000,
        };
        assert_eq!(p.delay(1), Duration::from_millis(500));
        assert_eq!(p.delay(2), Duration::from_millis(1_000));
        assert_eq!(p.delay(3), Duration::from_millis(2_000));
        assert_eq!(p.delay(4), Duration::from_millis(3_000));
        assert_eq!(p.delay(200), Duration::from_millis(3_000));
    }

    #[test]
    fn linear_grows_by_step() {
        let p = BackoffPolicy::Linear {
            step_ms: 250,
            max_ms: 600,
        };
        assert_eq!(p.delay(1), Duration::from_millis(250));
        assert_eq!(p.delay(2), Duration::from_millis(500));
        assert_eq!(p.delay(3), Duration::from_millis(600));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let p = BackoffPolicy::Exponential {
            base_ms: 100,
            max_ms: 5_000,
        };
        assert_eq!(
            p.delay_with_hint(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            p.delay_with_hint(1, Some(Duration::from_secs(60))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn deserializes_tagged() {
        let p: BackoffPolicy =
            serde_json::from_str(r#"{"kind":"linear","step_ms":10,"max_ms":20}"#).unwrap();
        assert_eq!(
            p,
            BackoffPolicy::Linear {
                step_ms: 10,
                max_ms: 20
            }
        );
        let none: BackoffPolicy = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(none, BackoffPolicy::None);
    }
}
