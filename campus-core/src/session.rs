//! Session context for tenant-scoped operations
//!
//! The session is an explicit, caller-owned object passed by reference into
//! every data operation. Nothing in the layer reads tenant identity from
//! ambient global state; a caller without a session cannot issue scoped
//! operations at all.

use crate::error::{DataError, DataResult};
use crate::identity::{TenantId, Timestamp, UserId};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// An authenticated identity as supplied by the external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// The provider-issued user id
    pub user_id: UserId,
    /// Whether the provider considers the user authenticated
    pub authenticated: bool,
}

impl Identity {
    /// An authenticated identity.
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id,
            authenticated: true,
        }
    }
}

/// Diagnostic snapshot of a session's usage. Not used for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDiagnostics {
    /// How many times the session has been consulted
    pub access_count: u64,
    /// When the session was created
    pub initialized_at: Timestamp,
    /// When the session was last consulted (None until first access)
    pub last_accessed: Option<Timestamp>,
}

/// A resolved tenant session.
///
/// Created by the tenant resolver on sign-in, shared via `Arc`, and dropped
/// on sign-out. The access counter and last-access timestamp are diagnostics
/// only; reading them never affects operation semantics.
#[derive(Debug)]
pub struct SessionContext {
    tenant_id: TenantId,
    user_id: UserId,
    initialized_at: Timestamp,
    access_count: AtomicU64,
    last_accessed_ms: AtomicI64,
}

impl SessionContext {
    /// Create a session for a resolved tenant. Rejects the nil tenant id:
    /// a cleared tenant must never be representable as a live session.
    pub fn new(tenant_id: TenantId, user_id: UserId) -> DataResult<Self> {
        if tenant_id.is_nil() {
            return Err(DataError::invalid_argument(
                "tenant_id",
                "must not be the nil UUID",
            ));
        }
        Ok(Self {
            tenant_id,
            user_id,
            initialized_at: Utc::now(),
            access_count: AtomicU64::new(0),
            last_accessed_ms: AtomicI64::new(0),
        })
    }

    /// The tenant this session is scoped to.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The authenticated user behind the session.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// When the session was created.
    pub fn initialized_at(&self) -> Timestamp {
        self.initialized_at
    }

    /// Record one diagnostic access (called by the resolver's cached-session
    /// accessor).
    pub fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Current diagnostic snapshot.
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let last_ms = self.last_accessed_ms.load(Ordering::Relaxed);
        SessionDiagnostics {
            access_count: self.access_count.load(Ordering::Relaxed),
            initialized_at: self.initialized_at,
            last_accessed: (last_ms != 0)
                .then(|| chrono::DateTime::from_timestamp_millis(last_ms))
                .flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_tenant_rejected() {
        let err = SessionContext::new(TenantId::new(uuid::Uuid::nil()), UserId::generate())
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument { .. }));
    }

    #[test]
    fn test_access_diagnostics() {
        let session = SessionContext::new(TenantId::generate(), UserId::generate()).unwrap();
        assert_eq!(session.diagnostics().access_count, 0);
        assert!(session.diagnostics().last_accessed.is_none());

        session.record_access();
        session.record_access();

        let diag = session.diagnostics();
        assert_eq!(diag.access_count, 2);
        assert!(diag.last_accessed.is_some());
    }
}
