//! Change-feed event types
//!
//! Every committed mutation is published on the backend's broadcast feed as
//! a [`ChangeEvent`]. Subscribers receive the raw payload (kind plus old/new
//! row) after the subscription manager has filtered by table, tenant, and
//! predicate.

use campus_core::{row_tenant_id, Row, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Stable textual name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row-level change, published post-commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the change occurred in
    pub table: String,
    /// Mutation kind
    pub kind: ChangeKind,
    /// Tenant owning the affected row, when derivable from it
    pub tenant_id: Option<TenantId>,
    /// Row state after the change (inserts and updates)
    pub new_row: Option<Row>,
    /// Row state before the change (updates and deletes)
    pub old_row: Option<Row>,
}

impl ChangeEvent {
    /// Event for an inserted row.
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            tenant_id: row_tenant_id(&row).map(TenantId::new),
            new_row: Some(row),
            old_row: None,
        }
    }

    /// Event for an updated row.
    pub fn update(table: impl Into<String>, old_row: Row, new_row: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            tenant_id: row_tenant_id(&new_row)
                .or_else(|| row_tenant_id(&old_row))
                .map(TenantId::new),
            new_row: Some(new_row),
            old_row: Some(old_row),
        }
    }

    /// Event for a deleted row.
    pub fn delete(table: impl Into<String>, old_row: Row) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            tenant_id: row_tenant_id(&old_row).map(TenantId::new),
            new_row: None,
            old_row: Some(old_row),
        }
    }

    /// The most recent row state the event carries (new row when present,
    /// otherwise the old row). Used for predicate matching.
    pub fn current_row(&self) -> Option<&Row> {
        self.new_row.as_ref().or(self.old_row.as_ref())
    }
}
