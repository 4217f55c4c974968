//! Exponential backoff for provider retries.

use std::time::Duration;

use rand::Rng;

use lithybrid_core::defaults;

/// Retry delay schedule: `base * 2^(attempt - 1)`, capped at `max`, plus
/// up to `jitter` (as a fraction) of random extra delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            max: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            jitter: 0.1,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Default::default()
        }
    }

    /// Disable jitter (tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    ///
    /// A provider-supplied `retry_after` wins when it is longer than the
    /// computed delay, even past `max`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let computed = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.max);
        let computed = if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            computed.mul_f64(1.0 + extra)
        } else {
            computed
        };

        match retry_after {
            Some(wait) if wait > computed => wait,
            _ => computed,
        }
    }
}
