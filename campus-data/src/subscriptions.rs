//! Live change-feed subscriptions
//!
//! One underlying feed task per distinct `(table, filters, tenant)` key;
//! additional subscribers with the same key fan out from the existing task.
//! Each delivered event first invalidates the result cache for its table,
//! then reaches every attached callback in arrival order. Callbacks are
//! invoked from a snapshot, never while holding the registry's locks.

use campus_core::{FilterSet, TenantId};
use campus_storage::{row_matches, ChangeEvent, ResultCache, StorageBackend};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked with every matching change event.
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Dedup key for an underlying channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubscriptionKey {
    table: String,
    filters: String,
    tenant_id: TenantId,
}

struct Channel {
    callbacks: Arc<DashMap<u64, ChangeCallback>>,
    task: JoinHandle<()>,
}

/// Manages deduplicated, tenant-scoped change-feed subscriptions.
pub struct SubscriptionManager {
    backend: Arc<dyn StorageBackend>,
    cache: Arc<ResultCache>,
    channels: DashMap<SubscriptionKey, Channel>,
    next_callback_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a manager over a backend's change feed.
    pub fn new(backend: Arc<dyn StorageBackend>, cache: Arc<ResultCache>) -> Self {
        Self {
            backend,
            cache,
            channels: DashMap::new(),
            next_callback_id: AtomicU64::new(1),
        }
    }

    /// Attach a callback for changes matching `(table, filters, tenant)`.
    ///
    /// If a channel for the key already exists the callback joins its
    /// fan-out; otherwise a new feed task is spawned. Must be called from
    /// within a tokio runtime.
    pub fn subscribe(
        self: &Arc<Self>,
        table: &str,
        filters: FilterSet,
        tenant_id: TenantId,
        callback: ChangeCallback,
    ) -> SubscriptionHandle {
        let key = SubscriptionKey {
            table: table.to_string(),
            filters: filters.canonical(),
            tenant_id,
        };
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);

        let entry = self.channels.entry(key.clone()).or_insert_with(|| {
            let callbacks: Arc<DashMap<u64, ChangeCallback>> = Arc::new(DashMap::new());
            let task = self.spawn_feed_task(
                key.table.clone(),
                filters,
                tenant_id,
                Arc::clone(&callbacks),
            );
            debug!(table, %tenant_id, "opened subscription channel");
            Channel { callbacks, task }
        });
        entry.callbacks.insert(id, callback);
        drop(entry);

        SubscriptionHandle {
            manager: Arc::clone(self),
            key,
            id,
            active: AtomicBool::new(true),
        }
    }

    fn spawn_feed_task(
        &self,
        table: String,
        filters: FilterSet,
        tenant_id: TenantId,
        callbacks: Arc<DashMap<u64, ChangeCallback>>,
    ) -> JoinHandle<()> {
        let mut feed = self.backend.change_feed();
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if event.table != table || event.tenant_id != Some(tenant_id) {
                            continue;
                        }

                        // Invalidation is table-wide: any notification for
                        // this table bounds staleness for every cached read
                        // of it, whether or not this subscription's filter
                        // matches the row. Invalidate before dispatch so a
                        // callback issuing a read never observes data staler
                        // than the event it was handed.
                        cache.invalidate_table(&table);

                        let matches = event
                            .current_row()
                            .map(|row| row_matches(row, &filters))
                            .unwrap_or(false);
                        if !matches {
                            continue;
                        }

                        let snapshot: Vec<ChangeCallback> =
                            callbacks.iter().map(|cb| cb.value().clone()).collect();
                        for callback in snapshot {
                            callback(&event);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(table = %table, missed, "subscription lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn detach(&self, key: &SubscriptionKey, id: u64) {
        let now_empty = match self.channels.get(key) {
            Some(channel) => {
                channel.callbacks.remove(&id);
                channel.callbacks.is_empty()
            }
            None => false,
        };
        if now_empty {
            // Guard against a subscriber that re-attached between the check
            // and the removal.
            if let Some((_, channel)) = self
                .channels
                .remove_if(key, |_, channel| channel.callbacks.is_empty())
            {
                channel.task.abort();
                debug!(table = %key.table, tenant_id = %key.tenant_id, "closed subscription channel");
            }
        }
    }

    /// Close every channel belonging to a tenant (sign-out). Returns the
    /// number of channels closed.
    pub fn teardown_tenant(&self, tenant_id: TenantId) -> usize {
        let keys: Vec<SubscriptionKey> = self
            .channels
            .iter()
            .filter(|entry| entry.key().tenant_id == tenant_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut closed = 0;
        for key in keys {
            if let Some((_, channel)) = self.channels.remove(&key) {
                channel.task.abort();
                closed += 1;
            }
        }
        if closed > 0 {
            debug!(%tenant_id, closed, "tore down tenant subscriptions");
        }
        closed
    }

    /// Number of open underlying channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Handle returned from [`SubscriptionManager::subscribe`].
///
/// Lifetime ends on explicit [`SubscriptionHandle::unsubscribe`] or when the
/// tenant's channels are torn down; dropping the handle alone leaves the
/// subscription attached.
pub struct SubscriptionHandle {
    manager: Arc<SubscriptionManager>,
    key: SubscriptionKey,
    id: u64,
    active: AtomicBool,
}

impl SubscriptionHandle {
    /// Detach this callback. When it was the last callback on the channel,
    /// the underlying channel is closed. Idempotent.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.manager.detach(&self.key, self.id);
        }
    }

    /// Whether this handle still has its callback attached.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
