use std::env;

use serde::{Deserialize, Serialize};

use crate::api::rate_limit::RateLimitConfig;
use crate::api::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_API_VERSION: &str = "2022-06-28";

/// Overrides `base_url` when set.
pub const BASE_URL_ENV: &str = "NOTIONFLEX_BASE_URL";
/// Overrides `api_version` when set.
pub const API_VERSION_ENV: &str = "NOTIONFLEX_API_VERSION";

/// Settings for talking to the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_version: String,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Defaults with any `NOTIONFLEX_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(version) = env::var(API_VERSION_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            config.api_version = version;
        }
        config
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"retry": {"max_retries": 0}}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.rate_limit.max_requests, 3);
    }
}
