//! Data layer configuration
//!
//! Loaded from environment variables with sensible defaults for development.

use campus_core::{CacheConfig, RetryPolicy};
use std::time::Duration;

/// Top-level configuration for the data layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    /// Retry policy applied to every backend operation
    pub retry: RetryPolicy,
    /// Result-cache TTL and capacity
    pub cache: CacheConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl DataConfig {
    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CAMPUS_RETRY_MAX_ATTEMPTS`: Total attempts per operation (default: 3)
    /// - `CAMPUS_RETRY_BACKOFF_MS`: Initial backoff in milliseconds (default: 100)
    /// - `CAMPUS_RETRY_MAX_BACKOFF_MS`: Backoff ceiling in milliseconds (default: 10000)
    /// - `CAMPUS_CACHE_TTL_SECS`: Result-cache TTL in seconds (default: 300)
    /// - `CAMPUS_CACHE_MAX_ENTRIES`: Result-cache capacity (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = env_parse("CAMPUS_RETRY_MAX_ATTEMPTS")
            .unwrap_or(defaults.retry.max_attempts);
        let backoff_ms = env_parse("CAMPUS_RETRY_BACKOFF_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.backoff_base);
        let max_backoff_ms = env_parse("CAMPUS_RETRY_MAX_BACKOFF_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.max_backoff);
        let ttl = env_parse("CAMPUS_CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache.ttl);
        let max_entries =
            env_parse("CAMPUS_CACHE_MAX_ENTRIES").unwrap_or(defaults.cache.max_entries);

        Self {
            retry: RetryPolicy::new(max_attempts, backoff_ms, max_backoff_ms),
            cache: CacheConfig { ttl, max_entries },
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DataConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(100));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.max_entries, 10_000);
    }
}
