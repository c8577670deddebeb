//! Configuration types for retry, caching, and per-table capabilities

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Retry policy for transient backend failures.
///
/// Attempt indices start at 0; the delay before attempt `i + 1` is
/// `backoff_base * 2^i`, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (always at least 1)
    pub max_attempts: u32,
    /// Initial backoff duration
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, clamping `max_attempts` to at least 1.
    pub fn new(max_attempts: u32, backoff_base: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay after the failed attempt with the given 0-based index.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Result-cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached result stays servable
    pub ttl: Duration,
    /// Upper bound on cached entries before oldest-first eviction
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_entries: 10_000,
        }
    }
}

/// Declared capabilities of a participating table.
///
/// Soft delete and optimistic locking both require schema support
/// (`is_deleted`/`deleted_at` and `version` columns); a table declares what
/// it supports instead of the layer guessing from column presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCapabilities {
    /// Table carries `is_deleted`/`deleted_at` marker columns
    pub soft_delete: bool,
    /// Table carries a `version` column maintained by the layer
    pub versioned: bool,
}

impl Default for TableCapabilities {
    fn default() -> Self {
        Self {
            soft_delete: true,
            versioned: true,
        }
    }
}

impl TableCapabilities {
    /// Capabilities for a bare table with neither marker nor version columns.
    pub fn bare() -> Self {
        Self {
            soft_delete: false,
            versioned: false,
        }
    }
}

/// Per-table capability registry with a configurable default.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    default: TableCapabilities,
    overrides: HashMap<String, TableCapabilities>,
}

impl CapabilityRegistry {
    /// Registry where unregistered tables get the given default.
    pub fn new(default: TableCapabilities) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Declare capabilities for a specific table.
    pub fn set(&mut self, table: impl Into<String>, capabilities: TableCapabilities) {
        self.overrides.insert(table.into(), capabilities);
    }

    /// Builder-style variant of [`CapabilityRegistry::set`].
    pub fn with(mut self, table: impl Into<String>, capabilities: TableCapabilities) -> Self {
        self.set(table, capabilities);
        self
    }

    /// Effective capabilities for a table.
    pub fn for_table(&self, table: &str) -> TableCapabilities {
        self.overrides.get(table).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_delay_respects_ceiling() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(4));
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_cache_config_default_ttl_is_five_minutes() {
        assert_eq!(CacheConfig::default().ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_capability_registry_default_and_override() {
        let registry = CapabilityRegistry::new(TableCapabilities::default())
            .with("audit_log", TableCapabilities::bare());

        assert!(registry.for_table("students").soft_delete);
        assert!(!registry.for_table("audit_log").soft_delete);
        assert!(!registry.for_table("audit_log").versioned);
    }
}
