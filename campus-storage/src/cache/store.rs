//! Time-boxed result cache with lazy eviction
//!
//! Entries expire after the configured TTL and are deleted on access, not
//! merely skipped. Writes and change-feed notifications invalidate by table;
//! sign-out invalidates by tenant or clears everything.

use campus_core::{CacheConfig, Row, TenantId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

use super::key::QueryKey;

struct CacheEntry {
    rows: Vec<Row>,
    created_at: Instant,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped by expiry or capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared, synchronized result cache.
///
/// All operations are short and synchronous; a single mutex over the map is
/// the entire locking story.
pub struct ResultCache {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a key. Expired entries are deleted on access and reported as
    /// a miss; a returned value is always younger than the TTL.
    pub fn get(&self, key: &QueryKey) -> Option<Vec<Row>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.created_at.elapsed() <= self.config.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.rows.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store rows under a key, overwriting any existing entry. At capacity,
    /// the oldest entry is evicted first.
    pub fn put(&self, key: QueryKey, rows: Vec<Row>) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                rows,
                created_at: Instant::now(),
            },
        );
    }

    /// Remove every entry derived from a table, across all tenants.
    /// Returns the number of entries removed.
    pub fn invalidate_table(&self, table: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| key.table() != table);
        let removed = before - entries.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(table, removed, "cache invalidated for table");
        }
        removed
    }

    /// Remove every entry belonging to a tenant. Returns the number of
    /// entries removed.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| key.tenant_id() != tenant_id);
        let removed = before - entries.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(%tenant_id, removed, "cache invalidated for tenant");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        let removed = entries.len();
        entries.clear();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        debug!(removed, "cache cleared");
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current usage statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::{FilterSet, LogicalQuery};
    use serde_json::json;
    use std::time::Duration;

    fn key_for(tenant: TenantId, table: &str, limit: Option<u32>) -> QueryKey {
        QueryKey::from_query(&LogicalQuery {
            table: table.to_string(),
            select: "*".to_string(),
            filters: FilterSet::new(),
            order_by: None,
            limit,
            offset: 0,
            tenant_id: tenant,
        })
    }

    fn one_row() -> Vec<Row> {
        let mut row = Row::new();
        row.insert("name".into(), json!("Asha"));
        vec![row]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResultCache::default();
        let key = key_for(TenantId::generate(), "students", None);
        cache.put(key.clone(), one_row());
        assert_eq!(cache.get(&key), Some(one_row()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_expired_entry_is_evicted_not_just_skipped() {
        let cache = ResultCache::new(CacheConfig {
            ttl: Duration::ZERO,
            max_entries: 16,
        });
        let key = key_for(TenantId::generate(), "students", None);
        cache.put(key.clone(), one_row());

        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.len(), 0, "expired entry must be deleted on access");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_table_only_touches_that_table() {
        let cache = ResultCache::default();
        let tenant = TenantId::generate();
        cache.put(key_for(tenant, "students", None), one_row());
        cache.put(key_for(tenant, "students", Some(10)), one_row());
        cache.put(key_for(tenant, "fees", None), one_row());

        assert_eq!(cache.invalidate_table("students"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key_for(tenant, "fees", None)).is_some());
    }

    #[test]
    fn test_invalidate_tenant() {
        let cache = ResultCache::default();
        let a = TenantId::generate();
        let b = TenantId::generate();
        cache.put(key_for(a, "students", None), one_row());
        cache.put(key_for(b, "students", None), one_row());

        assert_eq!(cache.invalidate_tenant(a), 1);
        assert!(cache.get(&key_for(a, "students", None)).is_none());
        assert!(cache.get(&key_for(b, "students", None)).is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResultCache::new(CacheConfig {
            ttl: Duration::from_secs(300),
            max_entries: 2,
        });
        let tenant = TenantId::generate();
        let first = key_for(tenant, "students", Some(1));
        let second = key_for(tenant, "students", Some(2));
        let third = key_for(tenant, "students", Some(3));

        cache.put(first.clone(), one_row());
        cache.put(second.clone(), one_row());
        cache.put(third.clone(), one_row());

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&first).is_none(), "oldest entry should be evicted");
        assert!(cache.get(&third).is_some());
    }

    #[test]
    fn test_clear_and_hit_rate() {
        let cache = ResultCache::default();
        let key = key_for(TenantId::generate(), "students", None);
        cache.put(key.clone(), one_row());
        let _ = cache.get(&key);
        let _ = cache.get(&key_for(TenantId::generate(), "fees", None));

        cache.clear();
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
