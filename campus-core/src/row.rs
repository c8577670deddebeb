//! Row representation and well-known columns
//!
//! The layer is schema-agnostic: rows are JSON objects, and the columns that
//! carry layer semantics (identity, tenancy, soft delete, versioning) are
//! addressed by name.

use serde_json::{Map, Value};
use uuid::Uuid;

/// A single table row.
pub type Row = Map<String, Value>;

/// Primary-key column present on every participating table.
pub const ID_COLUMN: &str = "id";

/// Tenant column present on every participating table.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Version column for tables with the optimistic-locking capability.
pub const VERSION_COLUMN: &str = "version";

/// Deletion marker for tables with the soft-delete capability.
pub const DELETED_COLUMN: &str = "is_deleted";

/// Deletion timestamp for tables with the soft-delete capability.
pub const DELETED_AT_COLUMN: &str = "deleted_at";

fn value_uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

/// The row's primary key, when present and well-formed.
pub fn row_id(row: &Row) -> Option<Uuid> {
    row.get(ID_COLUMN).and_then(value_uuid)
}

/// The row's tenant id, when present and well-formed.
pub fn row_tenant_id(row: &Row) -> Option<Uuid> {
    row.get(TENANT_COLUMN).and_then(value_uuid)
}

/// The row's optimistic-locking version, when present.
pub fn row_version(row: &Row) -> Option<i64> {
    row.get(VERSION_COLUMN).and_then(Value::as_i64)
}

/// Whether the row carries an active soft-delete marker. A missing column
/// means not deleted.
pub fn is_soft_deleted(row: &Row) -> bool {
    row.get(DELETED_COLUMN).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> Row {
        let id = Uuid::now_v7();
        let tenant = Uuid::now_v7();
        let mut row = Row::new();
        row.insert(ID_COLUMN.into(), json!(id.to_string()));
        row.insert(TENANT_COLUMN.into(), json!(tenant.to_string()));
        row.insert(VERSION_COLUMN.into(), json!(3));
        row.insert("name".into(), json!("Asha"));
        row
    }

    #[test]
    fn test_row_accessors() {
        let row = sample_row();
        assert!(row_id(&row).is_some());
        assert!(row_tenant_id(&row).is_some());
        assert_eq!(row_version(&row), Some(3));
    }

    #[test]
    fn test_malformed_id_is_none() {
        let mut row = sample_row();
        row.insert(ID_COLUMN.into(), json!("not-a-uuid"));
        assert_eq!(row_id(&row), None);
    }

    #[test]
    fn test_soft_delete_marker() {
        let mut row = sample_row();
        assert!(!is_soft_deleted(&row));
        row.insert(DELETED_COLUMN.into(), json!(true));
        assert!(is_soft_deleted(&row));
        row.insert(DELETED_COLUMN.into(), json!(false));
        assert!(!is_soft_deleted(&row));
    }
}
