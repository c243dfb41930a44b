//! Storage seam.
//!
//! The model layer talks to persistence exclusively through [`Storage`];
//! query builders and drivers live behind it. [`memory::MemoryStorage`]
//! implements the seam in-process for tests and prototyping.

use crate::error::OrmResult;
use crate::query::Query;
use crate::record::RecordId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

pub mod memory;

pub use memory::MemoryStorage;

/// One storage row: column name to value
pub type Row = BTreeMap<String, Value>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch rows matching the query, honoring order, limit and offset
    async fn select(&self, table: &str, query: &Query) -> OrmResult<Vec<Row>>;

    /// Count rows matching the query's conditions (pagination ignored)
    async fn count(&self, table: &str, query: &Query) -> OrmResult<u64>;

    /// Insert a row, returning the value of its primary-key column.
    /// A provided primary-key value is kept; otherwise one is assigned.
    async fn insert(&self, table: &str, primary_key: &str, values: Row) -> OrmResult<RecordId>;

    /// Insert several rows in one statement, returning the inserted count
    async fn insert_many(
        &self,
        table: &str,
        primary_key: &str,
        rows: Vec<Row>,
    ) -> OrmResult<u64>;

    /// Apply `values` to every row matching the query, returning the
    /// affected count
    async fn update(&self, table: &str, values: Row, query: &Query) -> OrmResult<u64>;

    /// Adjust a numeric column by `delta` as a single expression
    /// (`column = column + delta`), never read-then-write
    async fn adjust(&self, table: &str, column: &str, delta: i64, query: &Query)
        -> OrmResult<u64>;

    /// Delete rows matching the query, returning the removed count
    async fn delete(&self, table: &str, query: &Query) -> OrmResult<u64>;
}
