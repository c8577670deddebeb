//! Logical query shapes produced by the tenant query builder

use crate::filter::FilterSet;
use crate::identity::TenantId;
use serde::{Deserialize, Serialize};

/// Default result window applied when a caller paginates with an offset but
/// no explicit limit. An offset without a bound would otherwise request an
/// unbounded range from the backend.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Sort order for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column to sort on
    pub column: String,
    /// Ascending when true (the default for a bare column name)
    pub ascending: bool,
}

impl OrderBy {
    /// Ascending order on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

impl From<&str> for OrderBy {
    fn from(column: &str) -> Self {
        Self::asc(column)
    }
}

impl From<(String, bool)> for OrderBy {
    fn from((column, ascending): (String, bool)) -> Self {
        Self { column, ascending }
    }
}

/// Caller-facing query parameters, before tenant scoping is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Projection; `None` selects all columns
    pub select: Option<String>,
    /// Caller filters (ANDed together)
    pub filters: FilterSet,
    /// Sort order
    pub order_by: Option<OrderBy>,
    /// Maximum number of rows to return
    pub limit: Option<u32>,
    /// Number of rows to skip
    pub offset: Option<u32>,
    /// Include soft-deleted rows (tables with the soft-delete capability
    /// exclude them by default)
    pub include_deleted: bool,
}

impl QueryParams {
    /// Empty parameters: all columns, no filters, no pagination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the projection.
    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Append a filter.
    pub fn with_filter(mut self, filter: crate::filter::Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the filter set.
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Set the sort order.
    pub fn with_order(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    /// Set the row limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Include soft-deleted rows in the results.
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// A fully-scoped query ready for the storage backend.
///
/// Only the tenant query builder constructs these, which is what guarantees
/// the tenant constraint is always present in `filters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalQuery {
    /// Target table
    pub table: String,
    /// Projection (`"*"` for all columns)
    pub select: String,
    /// Effective filters, including the tenant constraint
    pub filters: FilterSet,
    /// Sort order
    pub order_by: Option<OrderBy>,
    /// Resolved row limit (`None` = unbounded)
    pub limit: Option<u32>,
    /// Rows to skip before the window starts
    pub offset: u32,
    /// The tenant this query is scoped to
    pub tenant_id: TenantId,
}

impl LogicalQuery {
    /// The inclusive row range `[offset, offset + limit - 1]` this query
    /// addresses, or `None` when unbounded from the start of the result set.
    pub fn range(&self) -> Option<(u32, u32)> {
        match self.limit {
            Some(limit) if limit > 0 => Some((self.offset, self.offset + limit - 1)),
            Some(_) => Some((self.offset, self.offset)),
            None if self.offset > 0 => Some((self.offset, self.offset + DEFAULT_PAGE_SIZE - 1)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_from_bare_column_is_ascending() {
        let order: OrderBy = "created_at".into();
        assert_eq!(order.column, "created_at");
        assert!(order.ascending);
    }

    #[test]
    fn test_order_by_from_pair() {
        let order: OrderBy = ("amount".to_string(), false).into();
        assert!(!order.ascending);
    }

    fn query_with(limit: Option<u32>, offset: u32) -> LogicalQuery {
        LogicalQuery {
            table: "students".into(),
            select: "*".into(),
            filters: FilterSet::new(),
            order_by: None,
            limit,
            offset,
            tenant_id: TenantId::generate(),
        }
    }

    #[test]
    fn test_range_limit_and_offset() {
        assert_eq!(query_with(Some(40), 80).range(), Some((80, 119)));
    }

    #[test]
    fn test_range_offset_without_limit_uses_default_window() {
        assert_eq!(
            query_with(None, 10).range(),
            Some((10, 10 + DEFAULT_PAGE_SIZE - 1))
        );
    }

    #[test]
    fn test_range_unbounded_when_no_pagination() {
        assert_eq!(query_with(None, 0).range(), None);
    }
}
