//! Tenant-scoped CRUD service
//!
//! The public entry point for data operations. Every method takes the
//! caller's [`SessionContext`] by reference, validates its inputs before any
//! backend call, executes through the retry executor, and keeps the result
//! cache coherent with writes.

use campus_core::{
    new_row_id, CapabilityRegistry, DataError, DataResult, Filter, FilterSet, QueryParams,
    RetryPolicy, Row, SessionContext, TenantId, Timestamp, DELETED_AT_COLUMN, DELETED_COLUMN,
    ID_COLUMN, TENANT_COLUMN, VERSION_COLUMN,
};
use campus_storage::{ChangeEvent, QueryKey, ResultCache, StorageBackend};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DataConfig;
use crate::query::TenantQueryBuilder;
use crate::retry;
use crate::subscriptions::{SubscriptionHandle, SubscriptionManager};

/// Default number of rows per batch-create chunk.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Options for [`DataService::create_batch`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Rows per chunk; chunks execute sequentially
    pub batch_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Options for [`DataService::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Optimistic-locking guard: the update applies only if the stored
    /// `version` equals this value, and increments it on success
    pub expected_version: Option<i64>,
}

/// Options for [`DataService::delete`].
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Permanently remove rows instead of setting the soft-delete marker
    pub hard_delete: bool,
}

/// Identifies the rows an update or delete targets.
#[derive(Debug, Clone)]
pub enum UpdateTarget {
    /// A single row by primary key
    Id(Uuid),
    /// All rows matching a filter set
    Filters(FilterSet),
}

impl UpdateTarget {
    fn into_filters(self) -> FilterSet {
        match self {
            UpdateTarget::Id(id) => {
                FilterSet::new().with(Filter::eq(ID_COLUMN, json!(id.to_string())))
            }
            UpdateTarget::Filters(filters) => filters,
        }
    }
}

impl From<Uuid> for UpdateTarget {
    fn from(id: Uuid) -> Self {
        UpdateTarget::Id(id)
    }
}

impl From<FilterSet> for UpdateTarget {
    fn from(filters: FilterSet) -> Self {
        UpdateTarget::Filters(filters)
    }
}

/// Result of a read, tagged with cache provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// Matching rows
    pub rows: Vec<Row>,
    /// Whether the rows came from the result cache
    pub from_cache: bool,
}

/// Snapshot returned by [`DataService::health_check`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `"healthy"` when the probe read succeeded
    pub status: String,
    /// Tenant the probe ran under
    pub tenant_id: TenantId,
    /// Live result-cache entries
    pub cache_entries: usize,
    /// Open subscription channels
    pub active_subscriptions: usize,
    /// When the probe ran
    pub checked_at: Timestamp,
}

/// The tenant-scoped CRUD service.
#[derive(Clone)]
pub struct DataService {
    backend: Arc<dyn StorageBackend>,
    cache: Arc<ResultCache>,
    subscriptions: Arc<SubscriptionManager>,
    retry_policy: RetryPolicy,
    capabilities: CapabilityRegistry,
}

impl DataService {
    /// Create a service over a backend with the given configuration.
    pub fn new(backend: Arc<dyn StorageBackend>, config: DataConfig) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
        ));
        Self {
            backend,
            cache,
            subscriptions,
            retry_policy: config.retry,
            capabilities: CapabilityRegistry::default(),
        }
    }

    /// Replace the per-table capability registry.
    pub fn with_capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The result cache (diagnostics and tests).
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// The subscription manager (diagnostics and tests).
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Insert one row. The row's `tenant_id` is forced to the session's
    /// tenant regardless of caller-supplied data; an `id` is assigned when
    /// absent; versioned tables start at `version = 1`. Returns the created
    /// rows normalized to a list.
    pub async fn create(
        &self,
        session: &SessionContext,
        table: &str,
        row: Row,
    ) -> DataResult<Vec<Row>> {
        validate_table(table)?;
        let stamped = self.stamp_row(session.tenant_id(), table, row);

        let backend = Arc::clone(&self.backend);
        let table_owned = table.to_string();
        let created = retry::execute(&self.retry_policy, move || {
            let backend = Arc::clone(&backend);
            let table = table_owned.clone();
            let rows = vec![stamped.clone()];
            async move { backend.insert(&table, rows).await }
        })
        .await?;

        self.cache.invalidate_table(table);
        debug!(table, rows = created.len(), "create");
        Ok(created)
    }

    /// Insert many rows in sequential chunks of `batch_size`.
    ///
    /// A chunk failure aborts the batch; rows committed by earlier chunks
    /// are NOT rolled back. The returned [`DataError::BatchFailed`] names
    /// the failing chunk (1-based) and how many rows had already committed,
    /// so callers can reconcile.
    pub async fn create_batch(
        &self,
        session: &SessionContext,
        table: &str,
        rows: Vec<Row>,
        options: BatchOptions,
    ) -> DataResult<Vec<Row>> {
        validate_table(table)?;
        if options.batch_size == 0 {
            return Err(DataError::invalid_argument(
                "batch_size",
                "must be at least 1",
            ));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let tenant_id = session.tenant_id();
        let stamped: Vec<Row> = rows
            .into_iter()
            .map(|row| self.stamp_row(tenant_id, table, row))
            .collect();

        let chunks: Vec<&[Row]> = stamped.chunks(options.batch_size).collect();
        let chunks_total = chunks.len();
        let mut committed: Vec<Row> = Vec::with_capacity(stamped.len());

        for (index, chunk) in chunks.into_iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let table_owned = table.to_string();
            let chunk_owned = chunk.to_vec();
            let result = retry::execute(&self.retry_policy, move || {
                let backend = Arc::clone(&backend);
                let table = table_owned.clone();
                let rows = chunk_owned.clone();
                async move { backend.insert(&table, rows).await }
            })
            .await;

            match result {
                Ok(mut rows) => committed.append(&mut rows),
                Err(source) => {
                    if !committed.is_empty() {
                        self.cache.invalidate_table(table);
                    }
                    warn!(
                        table,
                        chunk = index + 1,
                        chunks_total,
                        rows_committed = committed.len(),
                        "batch create aborted"
                    );
                    return Err(DataError::BatchFailed {
                        chunk_index: index + 1,
                        chunks_total,
                        rows_committed: committed.len(),
                        source: Box::new(source),
                    });
                }
            }
        }

        self.cache.invalidate_table(table);
        info!(table, rows = committed.len(), chunks = chunks_total, "batch create");
        Ok(committed)
    }

    // ========================================================================
    // READ
    // ========================================================================

    /// Read rows matching the parameters, serving from the result cache when
    /// an identical query was executed within the TTL.
    pub async fn read(
        &self,
        session: &SessionContext,
        table: &str,
        params: QueryParams,
    ) -> DataResult<ReadResult> {
        let query =
            TenantQueryBuilder::build(table, params, session.tenant_id(), &self.capabilities)?;
        let key = QueryKey::from_query(&query);

        if let Some(rows) = self.cache.get(&key) {
            debug!(table, rows = rows.len(), "read served from cache");
            return Ok(ReadResult {
                rows,
                from_cache: true,
            });
        }

        let backend = Arc::clone(&self.backend);
        let query_owned = query.clone();
        let rows = retry::execute(&self.retry_policy, move || {
            let backend = Arc::clone(&backend);
            let query = query_owned.clone();
            async move { backend.select(&query).await }
        })
        .await?;

        self.cache.put(key, rows.clone());
        debug!(table, rows = rows.len(), "read");
        Ok(ReadResult {
            rows,
            from_cache: false,
        })
    }

    /// Read exactly one row by id. Zero rows is `NotFound`; more than one
    /// row for a primary-key lookup is a `DataIntegrity` violation (checked,
    /// not assumed).
    pub async fn read_one(
        &self,
        session: &SessionContext,
        table: &str,
        id: Uuid,
    ) -> DataResult<Row> {
        let params = QueryParams::new()
            .with_filter(Filter::eq(ID_COLUMN, json!(id.to_string())));
        let result = self.read(session, table, params).await?;

        let mut rows = result.rows;
        match rows.len() {
            0 => Err(DataError::not_found_id(table, id)),
            1 => Ok(rows.remove(0)),
            found => Err(DataError::DataIntegrity {
                table: table.to_string(),
                reason: format!("expected exactly one row for id {id}, found {found}"),
            }),
        }
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Apply a patch to the rows identified by `target`, always constrained
    /// to the session's tenant.
    ///
    /// With `expected_version` set, the update is a compare-and-set against
    /// the stored `version` column: a concurrent modification yields
    /// `Conflict` and nothing is applied; on success the version increments.
    pub async fn update(
        &self,
        session: &SessionContext,
        table: &str,
        target: impl Into<UpdateTarget>,
        patch: Row,
        options: UpdateOptions,
    ) -> DataResult<Vec<Row>> {
        validate_table(table)?;
        let tenant_id = session.tenant_id();
        let target = target.into();
        let mut filters = self.scoped_filters(table, target.clone(), tenant_id);
        let mut patch = sanitize_patch(table, patch);

        if let Some(expected) = options.expected_version {
            if !self.capabilities.for_table(table).versioned {
                return Err(DataError::invalid_argument(
                    "expected_version",
                    format!("table '{table}' does not declare the versioned capability"),
                ));
            }
            filters.push(Filter::eq(VERSION_COLUMN, json!(expected)));
            patch.insert(VERSION_COLUMN.to_string(), json!(expected + 1));
        }

        let backend = Arc::clone(&self.backend);
        let table_owned = table.to_string();
        let filters_owned = filters.clone();
        let patch_owned = patch.clone();
        let updated = retry::execute(&self.retry_policy, move || {
            let backend = Arc::clone(&backend);
            let table = table_owned.clone();
            let filters = filters_owned.clone();
            let patch = patch_owned.clone();
            async move { backend.update(&table, &filters, patch).await }
        })
        .await?;

        if updated.is_empty() {
            if let Some(expected) = options.expected_version {
                // Nothing matched the version guard: distinguish a stale
                // version from a row that is simply gone.
                return Err(self
                    .classify_version_miss(session, table, target, expected)
                    .await?);
            }
        }

        self.cache.invalidate_table(table);
        debug!(table, rows = updated.len(), "update");
        Ok(updated)
    }

    async fn classify_version_miss(
        &self,
        session: &SessionContext,
        table: &str,
        target: UpdateTarget,
        expected: i64,
    ) -> DataResult<DataError> {
        let params = QueryParams::new()
            .with_filters(target.into_filters())
            .with_deleted();
        let query =
            TenantQueryBuilder::build(table, params, session.tenant_id(), &self.capabilities)?;
        let current = self.backend.select(&query).await?;

        Ok(match current.first() {
            Some(row) => DataError::Conflict {
                table: table.to_string(),
                expected,
                actual: campus_core::row_version(row).unwrap_or(0),
            },
            None => DataError::not_found(table),
        })
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    /// Delete the rows identified by `target`, constrained to the session's
    /// tenant. The default is a soft delete (marker + timestamp) for audit
    /// retention; tables without the soft-delete capability require an
    /// explicit `hard_delete`. Returns the number of rows affected.
    pub async fn delete(
        &self,
        session: &SessionContext,
        table: &str,
        target: impl Into<UpdateTarget>,
        options: DeleteOptions,
    ) -> DataResult<u64> {
        validate_table(table)?;
        let tenant_id = session.tenant_id();
        let filters = self.scoped_filters(table, target.into(), tenant_id);

        let affected = if options.hard_delete {
            let backend = Arc::clone(&self.backend);
            let table_owned = table.to_string();
            let filters_owned = filters.clone();
            retry::execute(&self.retry_policy, move || {
                let backend = Arc::clone(&backend);
                let table = table_owned.clone();
                let filters = filters_owned.clone();
                async move { backend.delete(&table, &filters).await }
            })
            .await?
        } else {
            if !self.capabilities.for_table(table).soft_delete {
                return Err(DataError::invalid_argument(
                    "hard_delete",
                    format!(
                        "table '{table}' does not support soft delete; \
                         pass hard_delete to remove rows permanently"
                    ),
                ));
            }
            let mut patch = Row::new();
            patch.insert(DELETED_COLUMN.to_string(), json!(true));
            patch.insert(
                DELETED_AT_COLUMN.to_string(),
                json!(Utc::now().to_rfc3339()),
            );

            let backend = Arc::clone(&self.backend);
            let table_owned = table.to_string();
            let filters_owned = filters.clone();
            let marked = retry::execute(&self.retry_policy, move || {
                let backend = Arc::clone(&backend);
                let table = table_owned.clone();
                let filters = filters_owned.clone();
                let patch = patch.clone();
                async move { backend.update(&table, &filters, patch).await }
            })
            .await?;
            marked.len() as u64
        };

        self.cache.invalidate_table(table);
        debug!(
            table,
            rows = affected,
            hard = options.hard_delete,
            "delete"
        );
        Ok(affected)
    }

    // ========================================================================
    // SUBSCRIBE
    // ========================================================================

    /// Subscribe to live changes on a table, scoped to the session's tenant
    /// and the given filters. The callback receives every matching change
    /// event in arrival order; the result cache is invalidated before each
    /// delivery.
    pub async fn subscribe(
        &self,
        session: &SessionContext,
        table: &str,
        mut filters: FilterSet,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> DataResult<SubscriptionHandle> {
        validate_table(table)?;
        let discarded = filters.remove_column(TENANT_COLUMN);
        if discarded > 0 {
            warn!(table, discarded, "discarding caller-supplied tenant_id filters");
        }

        Ok(self.subscriptions.subscribe(
            table,
            filters,
            session.tenant_id(),
            Arc::new(callback),
        ))
    }

    // ========================================================================
    // SESSION LIFECYCLE
    // ========================================================================

    /// Sign-out hook: tear down the tenant's subscriptions and drop its
    /// cached results. Safe to call more than once.
    pub fn end_session(&self, session: &SessionContext) {
        let tenant_id = session.tenant_id();
        let channels = self.subscriptions.teardown_tenant(tenant_id);
        let entries = self.cache.invalidate_tenant(tenant_id);
        info!(%tenant_id, channels, entries, "session ended");
    }

    /// Probe a one-row tenant-scoped read and report layer vitals.
    pub async fn health_check(&self, session: &SessionContext) -> DataResult<HealthReport> {
        let params = QueryParams::new().with_select(ID_COLUMN).with_limit(1);
        let query =
            TenantQueryBuilder::build("users", params, session.tenant_id(), &self.capabilities)?;
        self.backend.select(&query).await?;

        Ok(HealthReport {
            status: "healthy".to_string(),
            tenant_id: session.tenant_id(),
            cache_entries: self.cache.len(),
            active_subscriptions: self.subscriptions.channel_count(),
            checked_at: Utc::now(),
        })
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    /// Force the tenant column, assign an id when absent, and initialize the
    /// version column on versioned tables.
    fn stamp_row(&self, tenant_id: TenantId, table: &str, mut row: Row) -> Row {
        let tenant_value = json!(tenant_id.to_string());
        if let Some(previous) = row.insert(TENANT_COLUMN.to_string(), tenant_value.clone()) {
            if previous != tenant_value {
                warn!(table, "overriding caller-supplied tenant_id on create");
            }
        }
        if !row.contains_key(ID_COLUMN) {
            row.insert(ID_COLUMN.to_string(), json!(new_row_id().to_string()));
        }
        if self.capabilities.for_table(table).versioned && !row.contains_key(VERSION_COLUMN) {
            row.insert(VERSION_COLUMN.to_string(), json!(1));
        }
        row
    }

    /// Target filters with caller tenant filters stripped and the session's
    /// tenant constraint appended.
    fn scoped_filters(
        &self,
        table: &str,
        target: UpdateTarget,
        tenant_id: TenantId,
    ) -> FilterSet {
        let mut filters = target.into_filters();
        let discarded = filters.remove_column(TENANT_COLUMN);
        if discarded > 0 {
            warn!(table, discarded, "discarding caller-supplied tenant_id filters");
        }
        filters.push(Filter::eq(TENANT_COLUMN, json!(tenant_id.to_string())));
        filters
    }
}

fn validate_table(table: &str) -> DataResult<()> {
    if table.trim().is_empty() {
        return Err(DataError::invalid_argument("table", "must not be empty"));
    }
    Ok(())
}

/// Strip columns a patch must never change: rows cannot move across tenants
/// and primary keys are immutable.
fn sanitize_patch(table: &str, mut patch: Row) -> Row {
    if patch.remove(TENANT_COLUMN).is_some() {
        warn!(table, "discarding tenant_id from update patch");
    }
    if patch.remove(ID_COLUMN).is_some() {
        warn!(table, "discarding id from update patch");
    }
    patch
}
