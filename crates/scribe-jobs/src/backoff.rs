//! Exponential backoff with jitter for transient stage failures.

use std::time::Duration;

use rand::Rng;

use scribe_core::defaults;

/// Retry delay policy: `base * multiplier^attempt`, capped at `max`, with a
/// symmetric random jitter fraction applied to the capped delay.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`: the final delay lands uniformly in
    /// `capped * [1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            max: Duration::from_millis(defaults::BACKOFF_MAX_MS),
            multiplier: defaults::BACKOFF_MULTIPLIER,
            jitter: defaults::BACKOFF_JITTER,
        }
    }
}

impl BackoffPolicy {
    /// Zero-delay policy; retries become immediately claimable. Used in
    /// tests and batch drains.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay before the retry following the given 0-based attempt.
    pub fn delay(&self, attempt: i32) -> Duration {
        let exp = self.base.as_millis() as f64 * self.multiplier.powi(attempt.max(0));
        let capped = exp.min(self.max.as_millis() as f64);
        if capped <= 0.0 {
            return Duration::ZERO;
        }

        let jitter = self.jitter.clamp(0.0, 1.0);
        let millis = if jitter > 0.0 {
            let spread = capped * jitter;
            capped - spread + rand::thread_rng().gen::<f64>() * 2.0 * spread
        } else {
            capped
        };
        Duration::from_millis(millis.round().max(0.0) as u64)
    }
}
