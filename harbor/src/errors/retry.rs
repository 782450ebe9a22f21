use shared::config::RetryConfig;
use std::time::Duration;

/// How many times a retryable failure is attempted again, and how long to wait in between
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    /// Backoff growth per attempt; 1 keeps it fixed
    pub multiplier: u32,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration, multiplier: u32) -> Self {
        self.backoff = backoff;
        self.multiplier = multiplier.max(1);
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(retry.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    /// A single immediate retry
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::ZERO,
            multiplier: 1,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::default()
            .with_max_retries(config.max_retries)
            .with_backoff(Duration::from_millis(config.backoff_ms), config.multiplier)
    }
}
