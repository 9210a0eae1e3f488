use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Requests allowed per window by default.
pub const DEFAULT_MAX_REQUESTS: usize = 3;
/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Sliding-window limiter: at most `max_requests` grants in any rolling
/// window of `window` length.
///
/// The window of grant timestamps sits behind an async mutex. Pruning,
/// counting and appending all happen under one guard with no await in
/// between; waiting happens with the guard released and the whole check is
/// redone afterwards, since other callers may have taken the slot meanwhile.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn from_config(config: RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_millis(config.window_ms))
    }

    /// Waits until one more request fits in the window, then records it.
    pub async fn acquire(&self) {
        loop {
            let delay = {
                let mut window = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = window.front() {
                    if now.duration_since(oldest) >= self.window {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if window.len() < self.max_requests {
                    window.push_back(now);
                    return;
                }

                // Non-empty here: max_requests is at least one.
                let oldest = window[0];
                self.window.saturating_sub(now.duration_since(oldest))
            };

            debug!("Rate limit reached, waiting {delay:?}");
            sleep(delay).await;
        }
    }

    /// Grants currently inside the window.
    pub async fn in_flight(&self) -> usize {
        let window = self.timestamps.lock().await;
        let now = Instant::now();
        window
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn five_back_to_back_calls_split_across_two_windows() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        let mut completions = Vec::new();

        for _ in 0..5 {
            limiter.acquire().await;
            completions.push(start.elapsed());
        }

        let window = Duration::from_millis(DEFAULT_WINDOW_MS);
        assert_eq!(completions.iter().filter(|&&t| t < window).count(), 3);
        assert_eq!(completions.iter().filter(|&&t| t >= window).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_the_cap() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_millis(1000)));
        let start = Instant::now();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut completions = Vec::new();
        for handle in handles {
            completions.push(handle.await.unwrap());
        }
        completions.sort();

        // Any window of 1000ms holds at most 3 grants.
        for (i, &t) in completions.iter().enumerate() {
            let in_window = completions[i..]
                .iter()
                .take_while(|&&later| later - t < Duration::from_millis(1000))
                .count();
            assert!(in_window <= 3, "window starting at {t:?} held {in_window}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_grants_are_dropped() {
        let limiter = RateLimiter::new(2, Duration::from_millis(500));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight().await, 2);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.in_flight().await, 0);

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
