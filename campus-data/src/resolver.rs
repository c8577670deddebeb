//! Tenant resolution
//!
//! Maps an authenticated identity to its tenant via the `users` directory
//! table, gated on the tenant being active in the `tenants` table. The
//! resolver also owns the process's cached session: an optional convenience
//! for single-session callers, with an explicit set/get/clear lifecycle tied
//! to sign-in and sign-out.

use campus_core::{
    row_tenant_id, DataError, DataResult, Filter, FilterSet, Identity, SessionContext, TenantId,
    ID_COLUMN,
};
use campus_storage::StorageBackend;
use serde_json::json;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Directory table mapping user ids to tenants.
pub const USERS_TABLE: &str = "users";

/// Directory table of tenants and their status.
pub const TENANTS_TABLE: &str = "tenants";

const ACTIVE_STATUS: &str = "active";

/// Resolves identities to tenant sessions and caches the active session.
pub struct TenantResolver {
    backend: Arc<dyn StorageBackend>,
    cached: RwLock<Option<Arc<SessionContext>>>,
}

impl TenantResolver {
    /// Create a resolver over a backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            cached: RwLock::new(None),
        }
    }

    /// Resolve an identity to a tenant session.
    ///
    /// Fails with `TenantRequired` for unauthenticated identities,
    /// `NotFound` when the user has no tenant association, and
    /// `TenantInactive` when the tenant exists but its status is not
    /// `active`.
    pub async fn resolve(&self, identity: Identity) -> DataResult<Arc<SessionContext>> {
        if !identity.authenticated {
            return Err(DataError::TenantRequired {
                operation: "tenant resolution".to_string(),
            });
        }

        let user_filter = FilterSet::new().with(Filter::eq(
            ID_COLUMN,
            json!(identity.user_id.to_string()),
        ));
        let users = self.backend.lookup(USERS_TABLE, &user_filter).await?;
        let user = users
            .first()
            .ok_or_else(|| DataError::not_found_id(USERS_TABLE, identity.user_id.as_uuid()))?;

        let tenant_id = row_tenant_id(user)
            .map(TenantId::new)
            .ok_or_else(|| DataError::not_found_id(USERS_TABLE, identity.user_id.as_uuid()))?;

        let tenant_filter =
            FilterSet::new().with(Filter::eq(ID_COLUMN, json!(tenant_id.to_string())));
        let tenants = self.backend.lookup(TENANTS_TABLE, &tenant_filter).await?;
        let tenant = tenants
            .first()
            .ok_or_else(|| DataError::not_found_id(TENANTS_TABLE, tenant_id.as_uuid()))?;

        let status = tenant
            .get("status")
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        if status != ACTIVE_STATUS {
            return Err(DataError::TenantInactive { tenant_id });
        }

        let session = SessionContext::new(tenant_id, identity.user_id)?;
        info!(%tenant_id, user_id = %identity.user_id, "tenant resolved");
        Ok(Arc::new(session))
    }

    /// Resolve and cache in one step (sign-in).
    pub async fn sign_in(&self, identity: Identity) -> DataResult<Arc<SessionContext>> {
        let session = self.resolve(identity).await?;
        self.set_cached(Arc::clone(&session))?;
        Ok(session)
    }

    /// Store the active session. Rejects a nil tenant id so a cleared
    /// tenant can never be cached as a live one.
    pub fn set_cached(&self, session: Arc<SessionContext>) -> DataResult<()> {
        if session.tenant_id().is_nil() {
            return Err(DataError::invalid_argument(
                "tenant_id",
                "must not be the nil UUID",
            ));
        }
        *self.cached.write().unwrap() = Some(session);
        Ok(())
    }

    /// The cached session, if any. Each call records a diagnostic access on
    /// the session; no I/O is performed.
    pub fn get_cached(&self) -> Option<Arc<SessionContext>> {
        let guard = self.cached.read().unwrap();
        if let Some(session) = guard.as_ref() {
            session.record_access();
        }
        guard.clone()
    }

    /// The cached session, or `TenantRequired` when none is set. Callers
    /// that rely on the cached session go through this before issuing any
    /// data operation, which is what makes an absent tenant fail fast
    /// instead of querying unscoped.
    pub fn require_cached(&self) -> DataResult<Arc<SessionContext>> {
        self.get_cached().ok_or_else(|| DataError::TenantRequired {
            operation: "data operation".to_string(),
        })
    }

    /// Clear the cached session (sign-out). Idempotent.
    pub fn clear(&self) {
        let previous = self.cached.write().unwrap().take();
        if let Some(session) = previous {
            debug!(tenant_id = %session.tenant_id(), "cached session cleared");
        }
    }
}
