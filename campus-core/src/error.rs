//! Error types for Campus data-layer operations

use crate::identity::TenantId;
use thiserror::Error;
use uuid::Uuid;

fn display_opt_id(id: &Option<Uuid>) -> String {
    match id {
        Some(id) => format!(": {id}"),
        None => String::new(),
    }
}

/// All errors that can occur in data-layer operations.
///
/// A single taxonomy keeps function signatures simple and lets callers handle
/// errors uniformly. Retryability is a property of the error itself
/// ([`DataError::is_retryable`]): the retry executor consults it so that
/// validation, conflict, and constraint failures are never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    /// No tenant context is available for the operation.
    /// Raised before any backend call is made.
    #[error("tenant context required for {operation}")]
    TenantRequired {
        /// Description of the attempted operation, for diagnostics
        operation: String,
    },

    /// The resolved tenant exists but is not active.
    #[error("tenant {tenant_id} is not active")]
    TenantInactive {
        /// The inactive tenant
        tenant_id: TenantId,
    },

    /// A caller-supplied argument is invalid.
    /// Raised before any backend call is made.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument {
        /// The offending field or parameter
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// The requested row does not exist (within the caller's tenant).
    #[error("not found in '{table}'{}", display_opt_id(.id))]
    NotFound {
        /// Table that was queried
        table: String,
        /// Row id, when the lookup was by id
        id: Option<Uuid>,
    },

    /// Optimistic-locking conflict: the row was modified concurrently.
    #[error("conflict in '{table}': expected version {expected}, found {actual}")]
    Conflict {
        /// Table where the conflict occurred
        table: String,
        /// The version the caller expected
        expected: i64,
        /// The version actually stored
        actual: i64,
    },

    /// A storage constraint (unique key, foreign key, not-null) was violated.
    /// Passed through verbatim from the backend; retrying cannot succeed.
    #[error("constraint '{constraint}' violated in '{table}': {reason}")]
    ConstraintViolation {
        /// Table where the violation occurred
        table: String,
        /// Name of the violated constraint
        constraint: String,
        /// Backend-supplied detail
        reason: String,
    },

    /// An invariant the storage schema should make unreachable was observed
    /// (e.g. more than one row for a primary-key lookup).
    #[error("data integrity violation in '{table}': {reason}")]
    DataIntegrity {
        /// Table where the violation was observed
        table: String,
        /// What was observed
        reason: String,
    },

    /// The operation was cancelled by the caller before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// A transient backend failure. Retried automatically per policy; after
    /// exhaustion the final failure is propagated unchanged with the
    /// original cause in `reason`.
    #[error("transient backend failure: {reason}")]
    Transient {
        /// Backend-supplied cause
        reason: String,
    },

    /// The caller is authenticated but not permitted to perform the
    /// operation.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Why access was denied
        reason: String,
    },

    /// A batch create aborted partway through. Previously committed chunks
    /// are NOT rolled back; the fields carry enough context to reconcile.
    #[error(
        "batch create failed at chunk {chunk_index}/{chunks_total} \
         ({rows_committed} rows already committed): {source}"
    )]
    BatchFailed {
        /// One-based index of the failing chunk
        chunk_index: usize,
        /// Total number of chunks in the batch
        chunks_total: usize,
        /// Rows committed by earlier chunks
        rows_committed: usize,
        /// The failing chunk's error
        #[source]
        source: Box<DataError>,
    },
}

impl DataError {
    /// Whether the retry executor may retry this error.
    ///
    /// Only transient transport failures qualify; everything else either
    /// cannot succeed on retry (validation, conflict, constraint) or must
    /// surface immediately (cancellation, permission).
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Transient { .. })
    }

    /// Convenience constructor for [`DataError::InvalidArgument`].
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DataError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`DataError::NotFound`] by table.
    pub fn not_found(table: impl Into<String>) -> Self {
        DataError::NotFound {
            table: table.into(),
            id: None,
        }
    }

    /// Convenience constructor for [`DataError::NotFound`] by id.
    pub fn not_found_id(table: impl Into<String>, id: Uuid) -> Self {
        DataError::NotFound {
            table: table.into(),
            id: Some(id),
        }
    }

    /// Convenience constructor for [`DataError::Transient`].
    pub fn transient(reason: impl Into<String>) -> Self {
        DataError::Transient {
            reason: reason.into(),
        }
    }
}

/// Result type alias for data-layer operations.
pub type DataResult<T> = Result<T, DataError>;
