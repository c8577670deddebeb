//! Campus Test Utilities
//!
//! Centralized test infrastructure for the Campus workspace: row builders
//! for the school-domain tables used in tests, and fixtures that seed the
//! in-memory backend with resolvable tenants.

use std::sync::Arc;

// Re-export core types for convenience in test crates.
pub use campus_core::{
    CapabilityRegistry, DataError, DataResult, Filter, FilterOp, FilterSet, Identity,
    QueryParams, RetryPolicy, Row, SessionContext, TableCapabilities, TenantId, UserId,
};
pub use campus_storage::{ChangeEvent, ChangeKind, MemoryBackend, StorageBackend};

use serde_json::json;

/// A seeded tenant with one resolvable user.
#[derive(Debug, Clone, Copy)]
pub struct TenantFixture {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

impl TenantFixture {
    /// An authenticated identity for the fixture's user.
    pub fn identity(&self) -> Identity {
        Identity::authenticated(self.user_id)
    }

    /// A live session for the fixture's tenant.
    pub fn session(&self) -> Arc<SessionContext> {
        Arc::new(
            SessionContext::new(self.tenant_id, self.user_id)
                .expect("fixture tenant id is never nil"),
        )
    }
}

/// Seed a tenant (with the given status) and one user belonging to it into
/// the backend's directory tables.
pub async fn seed_tenant(backend: &MemoryBackend, name: &str, status: &str) -> TenantFixture {
    let fixture = TenantFixture {
        tenant_id: TenantId::generate(),
        user_id: UserId::generate(),
    };

    let mut tenant = Row::new();
    tenant.insert("id".into(), json!(fixture.tenant_id.to_string()));
    tenant.insert("name".into(), json!(name));
    tenant.insert("status".into(), json!(status));
    backend
        .insert("tenants", vec![tenant])
        .await
        .expect("seeding tenants must succeed");

    let mut user = Row::new();
    user.insert("id".into(), json!(fixture.user_id.to_string()));
    user.insert("tenant_id".into(), json!(fixture.tenant_id.to_string()));
    user.insert("email".into(), json!(format!("admin@{name}.test")));
    backend
        .insert("users", vec![user])
        .await
        .expect("seeding users must succeed");

    fixture
}

/// Seed an active tenant.
pub async fn seed_active_tenant(backend: &MemoryBackend, name: &str) -> TenantFixture {
    seed_tenant(backend, name, "active").await
}

/// A student row without layer-managed columns (the service stamps
/// `tenant_id`, `id`, and `version`).
pub fn student_row(name: &str, class_id: &str) -> Row {
    let mut row = Row::new();
    row.insert("name".into(), json!(name));
    row.insert("class_id".into(), json!(class_id));
    row.insert("admission_no".into(), json!(format!("ADM-{}", &name.to_lowercase())));
    row
}

/// A fee row tied to a student.
pub fn fee_row(student_id: &str, amount: i64) -> Row {
    let mut row = Row::new();
    row.insert("student_id".into(), json!(student_id));
    row.insert("amount".into(), json!(amount));
    row.insert("status".into(), json!("due"));
    row
}

/// `n` student rows named `prefix-0..n`, for batch tests.
pub fn student_rows(prefix: &str, n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| student_row(&format!("{prefix}-{i}"), "c-1"))
        .collect()
}
