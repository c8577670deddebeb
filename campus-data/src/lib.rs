//! Campus Data - Tenant-Scoped Data Access Layer
//!
//! The public surface of the Campus data layer. Every read, write, and
//! subscription is mediated here so that:
//!
//! - no caller can observe or mutate another tenant's rows,
//! - repeated reads are served from a short-lived result cache,
//! - transient backend failures are retried transparently, and
//! - callers can subscribe to live row-level changes scoped to their tenant.
//!
//! ## Architecture
//!
//! ```text
//! callers ──▶ DataService ──▶ TenantQueryBuilder ──▶ StorageBackend
//!                 │                                      │
//!                 ├──▶ ResultCache ◀── invalidation ──┐  │
//!                 ├──▶ retry (exponential backoff)    │  │
//!                 └──▶ SubscriptionManager ◀── change feed
//! ```
//!
//! Sessions are explicit: the [`TenantResolver`] turns an authenticated
//! identity into a [`campus_core::SessionContext`], and every service call
//! takes the session by reference. There is no ambient tenant global.

pub mod config;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod subscriptions;
pub mod telemetry;

pub use config::DataConfig;
pub use query::TenantQueryBuilder;
pub use resolver::TenantResolver;
pub use service::{
    BatchOptions, DataService, DeleteOptions, HealthReport, ReadResult, UpdateOptions,
    UpdateTarget,
};
pub use subscriptions::{ChangeCallback, SubscriptionHandle, SubscriptionManager};

// Re-export the types callers need to drive the service.
pub use campus_core::{
    is_soft_deleted, row_id, row_version, CacheConfig, CapabilityRegistry, DataError,
    DataResult, Filter, FilterOp, FilterSet, Identity, LogicalQuery, OrderBy, QueryParams,
    RetryPolicy, Row, SessionContext, TableCapabilities, TenantId, UserId,
};
pub use campus_storage::{ChangeEvent, ChangeKind, MemoryBackend, StorageBackend};
