//! Async storage backend trait
//!
//! The boundary between the data layer and the relational store. All scoped
//! operations receive filters that already include the tenant constraint;
//! [`StorageBackend::lookup`] is the single unscoped exception, reserved for
//! the identity-to-tenant directory tables consulted during resolution.

use async_trait::async_trait;
use campus_core::{DataResult, FilterSet, LogicalQuery, Row};
use tokio::sync::broadcast;

use crate::change::ChangeEvent;

/// Async storage operations against the relational store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Execute a tenant-scoped query and return the matching rows.
    async fn select(&self, query: &LogicalQuery) -> DataResult<Vec<Row>>;

    /// Insert rows into a table, returning them as stored (ids assigned).
    async fn insert(&self, table: &str, rows: Vec<Row>) -> DataResult<Vec<Row>>;

    /// Apply a patch to every row matching the filters, returning the
    /// updated rows. The filter evaluation and the patch application are a
    /// single atomic step with respect to concurrent writers.
    async fn update(&self, table: &str, filters: &FilterSet, patch: Row) -> DataResult<Vec<Row>>;

    /// Permanently remove every row matching the filters, returning the
    /// number of rows removed.
    async fn delete(&self, table: &str, filters: &FilterSet) -> DataResult<u64>;

    /// Unscoped directory read, used only by the tenant resolver against the
    /// `users` and `tenants` tables. Never exposed to data-operation callers.
    async fn lookup(&self, table: &str, filters: &FilterSet) -> DataResult<Vec<Row>>;

    /// Subscribe to the backend's change feed. Every committed insert,
    /// update, and delete is published after commit; receivers filter by
    /// table, tenant, and predicate.
    fn change_feed(&self) -> broadcast::Receiver<ChangeEvent>;
}
