//! Cache key derivation
//!
//! A key is a SHA-256 digest over the canonical serialization of the query
//! shape. The tenant id is part of the digest material AND carried alongside
//! it, so keys from different tenants can never collide and tenant-wide
//! invalidation does not need to re-derive queries.

use campus_core::{LogicalQuery, TenantId};
use sha2::{Digest, Sha256};

/// Cache key for one (tenant, table, query-shape) combination.
///
/// The table and tenant are kept in the clear for targeted invalidation;
/// the digest covers the full shape (select, filters, order, pagination).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    tenant_id: TenantId,
    table: String,
    digest: [u8; 32],
}

impl QueryKey {
    /// Derive the key for a scoped query.
    pub fn from_query(query: &LogicalQuery) -> Self {
        let order = query
            .order_by
            .as_ref()
            .map(|o| format!("{}:{}", o.column, o.ascending))
            .unwrap_or_default();
        let material = format!(
            "{}|{}|{}|{}|{}|{:?}|{}",
            query.tenant_id,
            query.table,
            query.select,
            query.filters.canonical(),
            order,
            query.limit,
            query.offset,
        );

        let mut hasher = Sha256::new();
        hasher.update(material.as_bytes());
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);

        Self {
            tenant_id: query.tenant_id,
            table: query.table.clone(),
            digest,
        }
    }

    /// The tenant this key is scoped to.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The table this key was derived from.
    pub fn table(&self) -> &str {
        &self.table
    }
}
