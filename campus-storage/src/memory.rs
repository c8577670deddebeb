//! In-memory storage backend
//!
//! Implements the full [`StorageBackend`] contract against in-process maps:
//! filter predicates, ordering, pagination, a unique-id constraint, and a
//! post-commit broadcast change feed. Used by tests and local development.
//! Failures can be injected to exercise the retry path.

use async_trait::async_trait;
use campus_core::{
    new_row_id, DataError, DataResult, FilterSet, LogicalQuery, Row, ID_COLUMN,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::change::ChangeEvent;
use crate::predicate::{compare, row_matches};

/// Default capacity of the change-feed broadcast channel.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 1024;

/// In-memory storage backend with a broadcast change feed.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
    change_tx: broadcast::Sender<ChangeEvent>,
    injected_failures: Mutex<VecDeque<Option<DataError>>>,
    call_count: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}

impl MemoryBackend {
    /// Create a backend with the default change-feed capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with an explicit change-feed capacity.
    pub fn with_capacity(change_feed_capacity: usize) -> Self {
        let (change_tx, _rx) = broadcast::channel(change_feed_capacity);
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            change_tx,
            injected_failures: Mutex::new(VecDeque::new()),
            call_count: AtomicU64::new(0),
        }
    }

    /// Queue an error to be returned by the next storage operation.
    pub fn inject_failure(&self, error: DataError) {
        self.injected_failures.lock().unwrap().push_back(Some(error));
    }

    /// Queue `n` transient failures, exercising the retry path.
    pub fn inject_transient_failures(&self, n: usize) {
        let mut queue = self.injected_failures.lock().unwrap();
        for _ in 0..n {
            queue.push_back(Some(DataError::transient("injected failure")));
        }
    }

    /// Let the next `n` operations pass before any queued failure fires.
    /// Positions an injected failure at the (n+1)-th upcoming call.
    pub fn inject_passes(&self, n: usize) {
        let mut queue = self.injected_failures.lock().unwrap();
        for _ in 0..n {
            queue.push_back(None);
        }
    }

    /// Total storage operations attempted (including injected failures).
    pub fn call_count(&self) -> u64 {
        self.call_count.load(AtomicOrdering::Relaxed)
    }

    /// Number of rows currently stored in a table.
    pub fn table_len(&self, table: &str) -> usize {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.tables.write().unwrap().clear();
    }

    fn begin_call(&self) -> DataResult<()> {
        self.call_count.fetch_add(1, AtomicOrdering::Relaxed);
        match self.injected_failures.lock().unwrap().pop_front() {
            Some(Some(error)) => Err(error),
            Some(None) | None => Ok(()),
        }
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers is fine; events are only interesting to subscribers.
        let _ = self.change_tx.send(event);
    }

    fn project(row: &Row, select: &str) -> Row {
        if select.trim() == "*" {
            return row.clone();
        }
        select
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .filter_map(|column| {
                row.get(column)
                    .map(|value| (column.to_string(), value.clone()))
            })
            .collect()
    }

    fn order_rows(rows: &mut [Row], column: &str, ascending: bool) {
        rows.sort_by(|a, b| {
            let va = a.get(column).unwrap_or(&Value::Null);
            let vb = b.get(column).unwrap_or(&Value::Null);
            let ord = compare(va, vb).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn select(&self, query: &LogicalQuery) -> DataResult<Vec<Row>> {
        self.begin_call()?;
        let tables = self.tables.read().unwrap();
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = &query.order_by {
            Self::order_rows(&mut rows, &order.column, order.ascending);
        }

        if let Some((start, end)) = query.range() {
            let window = (end - start + 1) as usize;
            rows = rows.into_iter().skip(start as usize).take(window).collect();
        }

        debug!(table = %query.table, rows = rows.len(), "select");
        Ok(rows
            .iter()
            .map(|row| Self::project(row, &query.select))
            .collect())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> DataResult<Vec<Row>> {
        self.begin_call()?;
        let mut tables = self.tables.write().unwrap();
        let stored = tables.entry(table.to_string()).or_default();

        // Assign missing ids first, then validate uniqueness across both the
        // table and the batch itself before mutating anything: a statement
        // either inserts every row or none.
        let mut prepared = Vec::with_capacity(rows.len());
        for mut row in rows {
            if !row.contains_key(ID_COLUMN) {
                row.insert(
                    ID_COLUMN.to_string(),
                    Value::String(new_row_id().to_string()),
                );
            }
            prepared.push(row);
        }
        for (index, row) in prepared.iter().enumerate() {
            let id = row.get(ID_COLUMN);
            let duplicate = stored.iter().any(|existing| existing.get(ID_COLUMN) == id)
                || prepared[..index]
                    .iter()
                    .any(|earlier| earlier.get(ID_COLUMN) == id);
            if duplicate {
                return Err(DataError::ConstraintViolation {
                    table: table.to_string(),
                    constraint: format!("{table}_pkey"),
                    reason: format!(
                        "duplicate id {}",
                        id.cloned().unwrap_or(Value::Null)
                    ),
                });
            }
        }
        stored.extend(prepared.iter().cloned());
        drop(tables);

        for row in &prepared {
            self.publish(ChangeEvent::insert(table, row.clone()));
        }
        debug!(table, rows = prepared.len(), "insert");
        Ok(prepared)
    }

    async fn update(&self, table: &str, filters: &FilterSet, patch: Row) -> DataResult<Vec<Row>> {
        self.begin_call()?;
        let mut tables = self.tables.write().unwrap();
        let mut events = Vec::new();
        let mut updated = Vec::new();

        if let Some(stored) = tables.get_mut(table) {
            for row in stored.iter_mut() {
                if row_matches(row, filters) {
                    let old = row.clone();
                    for (column, value) in &patch {
                        row.insert(column.clone(), value.clone());
                    }
                    events.push(ChangeEvent::update(table, old, row.clone()));
                    updated.push(row.clone());
                }
            }
        }
        drop(tables);

        for event in events {
            self.publish(event);
        }
        debug!(table, rows = updated.len(), "update");
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &FilterSet) -> DataResult<u64> {
        self.begin_call()?;
        let mut tables = self.tables.write().unwrap();
        let mut removed = Vec::new();

        if let Some(stored) = tables.get_mut(table) {
            stored.retain(|row| {
                if row_matches(row, filters) {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }
        drop(tables);

        let count = removed.len() as u64;
        for row in removed {
            self.publish(ChangeEvent::delete(table, row));
        }
        debug!(table, rows = count, "delete");
        Ok(count)
    }

    async fn lookup(&self, table: &str, filters: &FilterSet) -> DataResult<Vec<Row>> {
        self.begin_call()?;
        let tables = self.tables.read().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn change_feed(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_tx.subscribe()
    }
}
