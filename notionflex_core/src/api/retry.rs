use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// Bounded exponential backoff.
///
/// An operation is attempted at most `max_retries + 1` times. The wait before
/// attempt `i` (1-indexed, `i >= 2`) is `base_delay * backoff_multiplier^(i-2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// No retries: a single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay slept before the given attempt (1-indexed). Zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 2);
        let secs = self.base_delay_ms as f64 * factor / 1000.0;
        // Negative or NaN multipliers mean no wait; overflow saturates.
        Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    /// Runs `op` until it succeeds or retries are exhausted.
    ///
    /// `on_retry` sees each failure that is about to be retried, together with
    /// the number of retries still remaining before the wait.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(&E, u32),
    {
        let mut attempt = 1;
        let mut remaining = self.max_retries;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if remaining == 0 => return Err(err),
                Err(err) => {
                    on_retry(&err, remaining);
                    attempt += 1;
                    remaining -= 1;
                    sleep(self.delay_before(attempt)).await;
                }
            }
        }
    }
}
