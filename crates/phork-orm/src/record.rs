//! Records and the cursor-addressable record collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved record identity, distinct from the storage primary-key column so
/// the column can be renamed without touching identity handling.
pub type RecordId = i64;

/// One persisted entity as an in-memory attribute bag.
///
/// Two records are never "the same" beyond attribute equality; identity lives
/// in `id`, mirrored from the primary-key column by the owning model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: Option<RecordId>,
    attrs: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a storage row; identity is not derived here
    pub fn from_row(row: BTreeMap<String, Value>) -> Self {
        Self {
            id: None,
            attrs: row,
        }
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)
    }

    /// Attribute value, `Null` when absent
    pub fn attr(&self, attr: &str) -> Value {
        self.attrs.get(attr).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, attr: impl Into<String>, value: Value) {
        self.attrs.insert(attr.into(), value);
    }

    pub fn unset(&mut self, attr: &str) -> Option<Value> {
        self.attrs.remove(attr)
    }

    pub fn has(&self, attr: &str) -> bool {
        self.attrs.contains_key(attr)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Project the named columns into a row, skipping absent attributes
    pub fn columns(&self, names: &[String]) -> BTreeMap<String, Value> {
        names
            .iter()
            .filter_map(|name| self.attrs.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Ordered, index-addressable sequence of records with a single cursor.
///
/// The cursor is not serialized; a collection restored from the cache starts
/// rewound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    records: Vec<Record>,
    #[serde(skip, default)]
    position: usize,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Insert at `index` (clamped to the end), shifting the cursor so it
    /// keeps pointing at the same record
    pub fn insert(&mut self, index: usize, record: Record) {
        let index = index.min(self.records.len());
        self.records.insert(index, record);
        if index <= self.position {
            self.position += 1;
        }
    }

    /// Remove the record at `index`, adjusting the cursor so the current
    /// record is preserved where possible
    pub fn remove(&mut self, index: usize) -> Option<Record> {
        if index >= self.records.len() {
            return None;
        }
        let record = self.records.remove(index);
        if index < self.position {
            self.position -= 1;
        }
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.position = 0;
    }

    /// Cursor index; meaningful only while `valid()`
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn valid(&self) -> bool {
        self.position < self.records.len()
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Move the cursor forward and return the new current record
    pub fn advance(&mut self) -> Option<&Record> {
        if self.position < self.records.len() {
            self.position += 1;
        }
        self.records.get(self.position)
    }

    /// Position the cursor on `index` if it addresses a record
    pub fn seek(&mut self, index: usize) -> bool {
        if index < self.records.len() {
            self.position = index;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&Record> {
        self.records.get(self.position)
    }

    pub fn current_mut(&mut self) -> Option<&mut Record> {
        self.records.get_mut(self.position)
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}
