//! Engine-level error type and job retry budgeting.

use crate::kernel::ApiError;

/// Failures surfaced by the rule pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The rule is gone; the job terminates instead of retrying.
    #[error("automation rule {0} not found")]
    RuleNotFound(String),

    /// External API failure that survived the rate limiter's retries.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Durable or coordination store failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Terminal errors drop the job; everything else retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineError::RuleNotFound(_))
    }
}

/// Pick a retry delay from the failure text.
///
/// Rate-limit failures wait the longest, network blips the shortest,
/// everything else in between. Each ladder doubles per retry and caps.
pub fn retry_delay_ms(error_message: &str, retry_count: u32) -> u64 {
    let message = error_message.to_lowercase();
    let doubled = |base: u64, cap: u64| {
        base.saturating_mul(2u64.saturating_pow(retry_count)).min(cap)
    };

    if message.contains("rate limit") || message.contains("429") {
        doubled(60_000, 300_000)
    } else if message.contains("network") || message.contains("timeout") {
        doubled(5_000, 60_000)
    } else {
        doubled(10_000, 120_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_failures_wait_longest() {
        assert_eq!(retry_delay_ms("rate limit exceeded", 0), 60_000);
        assert_eq!(retry_delay_ms("got HTTP 429", 1), 120_000);
        assert_eq!(retry_delay_ms("rate limit", 5), 300_000);
    }

    #[test]
    fn network_failures_retry_fast() {
        assert_eq!(retry_delay_ms("network unreachable", 0), 5_000);
        assert_eq!(retry_delay_ms("read timeout", 2), 20_000);
        assert_eq!(retry_delay_ms("timeout", 10), 60_000);
    }

    #[test]
    fn other_failures_take_the_middle_ladder() {
        assert_eq!(retry_delay_ms("boom", 0), 10_000);
        assert_eq!(retry_delay_ms("boom", 2), 40_000);
        assert_eq!(retry_delay_ms("boom", 10), 120_000);
    }

    #[test]
    fn rule_not_found_is_terminal() {
        assert!(EngineError::RuleNotFound("r1".into()).is_terminal());
        assert!(!EngineError::Api(ApiError::new("x")).is_terminal());
    }
}
