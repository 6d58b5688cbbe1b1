//! Time and backoff primitives shared by the scheduler, rate limiter, and
//! engine. All coordination-store scores are epoch milliseconds.

use rand::Rng;

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before retrying `attempt` (1-based): `initial * multiplier^(attempt-1)`,
    /// capped at `max_delay_ms`. Jitter scales by a uniform sample in [0.5, 1.0).
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.max_delay_ms as f64);
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.0);
            (capped * factor) as u64
        } else {
            capped as u64
        }
    }
}
