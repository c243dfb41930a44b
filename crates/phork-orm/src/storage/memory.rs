//! In-memory storage backend.
//!
//! A test double faithful to the seam's observable behavior: condition
//! evaluation, ordering (including random), pagination, id assignment and
//! expression-style counter adjustment. Grouping is not emulated. Writes can
//! be failed on demand, globally or per table, to exercise failure paths.

use crate::error::{OrmError, OrmResult};
use crate::query::{compare, Direction, Query};
use crate::record::RecordId;
use crate::storage::{Row, Storage};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: RecordId,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: DashMap<String, Mutex<Table>>,
    fail_all_writes: AtomicBool,
    failing_tables: DashSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent write
    pub fn fail_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Fail subsequent writes to one table only
    pub fn fail_table(&self, table: &str) {
        self.failing_tables.insert(table.to_string());
    }

    pub fn restore_table(&self, table: &str) {
        self.failing_tables.remove(table);
    }

    /// Raw rows of a table, for test assertions
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|t| t.lock().rows.clone())
            .unwrap_or_default()
    }

    fn check_writable(&self, table: &str) -> OrmResult<()> {
        if self.fail_all_writes.load(AtomicOrdering::SeqCst)
            || self.failing_tables.contains(table)
        {
            Err(OrmError::Database(format!(
                "write to '{}' refused (failure injected)",
                table
            )))
        } else {
            Ok(())
        }
    }

    fn matching(&self, table: &str, query: &Query) -> Vec<Row> {
        let Some(entry) = self.tables.get(table) else {
            return Vec::new();
        };
        let guard = entry.lock();
        guard
            .rows
            .iter()
            .filter(|row| query.conditions.iter().all(|cond| cond.matches(row)))
            .filter(|row| query.having.iter().all(|cond| cond.matches(row)))
            .cloned()
            .collect()
    }
}

fn order_rows(rows: &mut [Row], query: &Query) {
    if query.random_order {
        rows.shuffle(&mut rand::thread_rng());
        return;
    }
    if query.order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in &query.order {
            let left = a.get(&order.column).unwrap_or(&Value::Null);
            let right = b.get(&order.column).unwrap_or(&Value::Null);
            let ord = compare(left, right).unwrap_or(Ordering::Equal);
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn paginate(rows: Vec<Row>, query: &Query) -> Vec<Row> {
    let offset = query.offset.unwrap_or(0) as usize;
    let rows: Vec<Row> = rows.into_iter().skip(offset).collect();
    match query.limit {
        Some(limit) => rows.into_iter().take(limit as usize).collect(),
        None => rows,
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn select(&self, table: &str, query: &Query) -> OrmResult<Vec<Row>> {
        let mut rows = self.matching(table, query);
        order_rows(&mut rows, query);
        Ok(paginate(rows, query))
    }

    async fn count(&self, table: &str, query: &Query) -> OrmResult<u64> {
        Ok(self.matching(table, query).len() as u64)
    }

    async fn insert(&self, table: &str, primary_key: &str, mut values: Row) -> OrmResult<RecordId> {
        self.check_writable(table)?;
        let entry = self.tables.entry(table.to_string()).or_default();
        let mut guard = entry.lock();

        let id = match values.get(primary_key).and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                guard.next_id += 1;
                guard.next_id
            }
        };
        guard.next_id = guard.next_id.max(id);
        values.insert(primary_key.to_string(), Value::from(id));
        guard.rows.push(values);
        Ok(id)
    }

    async fn insert_many(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
    ) -> OrmResult<u64> {
        self.check_writable(table)?;
        let mut inserted = 0;
        for row in rows {
            self.insert(table, primary_key, row).await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update(&self, table: &str, values: Row, query: &Query) -> OrmResult<u64> {
        self.check_writable(table)?;
        let Some(entry) = self.tables.get(table) else {
            return Ok(0);
        };
        let mut guard = entry.lock();
        let mut affected = 0;
        for row in guard.rows.iter_mut() {
            if query.conditions.iter().all(|cond| cond.matches(row)) {
                for (column, value) in &values {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn adjust(
        &self,
        table: &str,
        column: &str,
        delta: i64,
        query: &Query,
    ) -> OrmResult<u64> {
        self.check_writable(table)?;
        let Some(entry) = self.tables.get(table) else {
            return Ok(0);
        };
        let mut guard = entry.lock();
        let mut affected = 0;
        for row in guard.rows.iter_mut() {
            if query.conditions.iter().all(|cond| cond.matches(row)) {
                let current = row.get(column).and_then(Value::as_i64).unwrap_or(0);
                row.insert(column.to_string(), Value::from(current + delta));
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, query: &Query) -> OrmResult<u64> {
        self.check_writable(table)?;
        let Some(entry) = self.tables.get(table) else {
            return Ok(0);
        };
        let mut guard = entry.lock();
        let before = guard.rows.len();
        guard
            .rows
            .retain(|row| !query.conditions.iter().all(|cond| cond.matches(row)));
        Ok((before - guard.rows.len()) as u64)
    }
}
