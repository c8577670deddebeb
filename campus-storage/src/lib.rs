//! Campus Storage - Storage Trait, In-Memory Backend, and Result Cache
//!
//! Defines the storage abstraction the data layer runs against. A production
//! deployment points [`StorageBackend`] at the relational store; the
//! [`MemoryBackend`] here implements the full contract in memory (filter
//! predicates, unique-id constraint, change feed) for tests and development.

pub mod backend;
pub mod cache;
pub mod change;
pub mod memory;
pub mod predicate;

pub use backend::StorageBackend;
pub use cache::{CacheStats, QueryKey, ResultCache};
pub use change::{ChangeEvent, ChangeKind};
pub use memory::MemoryBackend;
pub use predicate::row_matches;
