//! Tenant query builder
//!
//! The only constructor of [`LogicalQuery`] values. Every built query carries
//! an equality constraint on `tenant_id` that caller-supplied filters cannot
//! override: a caller filter on the tenant column is discarded (with a
//! warning) before the real constraint is appended.

use campus_core::{
    CapabilityRegistry, DataError, DataResult, Filter, LogicalQuery, QueryParams, TenantId,
    DEFAULT_PAGE_SIZE, DELETED_COLUMN, TENANT_COLUMN,
};
use serde_json::json;
use tracing::warn;

/// Builds tenant-scoped logical queries.
#[derive(Debug, Default, Clone)]
pub struct TenantQueryBuilder;

impl TenantQueryBuilder {
    /// Build a scoped query for a table.
    ///
    /// Rejects an empty table name and the nil tenant id with
    /// `InvalidArgument`. When the table declares the soft-delete capability
    /// and the caller did not ask for deleted rows, an implicit
    /// `is_deleted != true` filter is appended.
    pub fn build(
        table: &str,
        params: QueryParams,
        tenant_id: TenantId,
        capabilities: &CapabilityRegistry,
    ) -> DataResult<LogicalQuery> {
        if table.trim().is_empty() {
            return Err(DataError::invalid_argument("table", "must not be empty"));
        }
        if tenant_id.is_nil() {
            return Err(DataError::invalid_argument(
                "tenant_id",
                "must not be the nil UUID",
            ));
        }

        let mut filters = params.filters;
        let discarded = filters.remove_column(TENANT_COLUMN);
        if discarded > 0 {
            warn!(
                table,
                discarded, "discarding caller-supplied tenant_id filters"
            );
        }
        filters.push(Filter::eq(TENANT_COLUMN, json!(tenant_id.to_string())));

        if capabilities.for_table(table).soft_delete && !params.include_deleted {
            filters.push(Filter::neq(DELETED_COLUMN, json!(true)));
        }

        // An offset without a limit still gets a bounded window.
        let limit = params.limit.or_else(|| {
            params
                .offset
                .filter(|offset| *offset > 0)
                .map(|_| DEFAULT_PAGE_SIZE)
        });

        Ok(LogicalQuery {
            table: table.to_string(),
            select: params.select.unwrap_or_else(|| "*".to_string()),
            filters,
            order_by: params.order_by,
            limit,
            offset: params.offset.unwrap_or(0),
            tenant_id,
        })
    }
}
