//! Filter description handed to the storage seam.
//!
//! This is data, not SQL: the storage implementation decides how to execute
//! it. The whole structure serializes, which is what makes cache keys for
//! identical load calls identical.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operators supported by the storage seam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Like,
    IsNull,
    NotNull,
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub cmp: Cmp,
    pub value: Value,
}

impl Condition {
    /// Evaluate the condition against a row. Numbers compare numerically,
    /// strings lexically; `Like` treats `%` as a wildcard.
    pub fn matches(&self, row: &BTreeMap<String, Value>) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Value::Null);
        match self.cmp {
            Cmp::IsNull => cell.is_null(),
            Cmp::NotNull => !cell.is_null(),
            Cmp::Eq => compare(cell, &self.value) == Some(Ordering::Equal),
            Cmp::Ne => {
                compare(cell, &self.value).map_or(true, |ord| ord != Ordering::Equal)
            }
            Cmp::Gt => compare(cell, &self.value) == Some(Ordering::Greater),
            Cmp::Ge => matches!(
                compare(cell, &self.value),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Cmp::Lt => compare(cell, &self.value) == Some(Ordering::Less),
            Cmp::Le => matches!(
                compare(cell, &self.value),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            Cmp::In => self
                .value
                .as_array()
                .map_or(false, |candidates| {
                    candidates
                        .iter()
                        .any(|candidate| compare(cell, candidate) == Some(Ordering::Equal))
                }),
            Cmp::Like => match (cell.as_str(), self.value.as_str()) {
                (Some(text), Some(pattern)) => like_matches(text, pattern),
                _ => false,
            },
            Cmp::Between => self
                .value
                .as_array()
                .filter(|bounds| bounds.len() == 2)
                .map_or(false, |bounds| {
                    matches!(
                        compare(cell, &bounds[0]),
                        Some(Ordering::Greater) | Some(Ordering::Equal)
                    ) && matches!(
                        compare(cell, &bounds[1]),
                        Some(Ordering::Less) | Some(Ordering::Equal)
                    )
                }),
        }
    }
}

/// Cross-type value comparison used by conditions and ordering
pub(crate) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn like_matches(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    let mut remainder = text;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(at) => remainder = &remainder[at + part.len()..],
                None => return false,
            }
        }
    }
    // A pattern without a trailing wildcard must consume the whole text.
    pattern.ends_with('%') || remainder.is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Load/delete filter: conditions, grouping, ordering and pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    pub having: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub random_order: bool,
    pub count_total: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, cmp: Cmp, value: Value) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            cmp,
            value,
        });
        self
    }

    /// Equality shortcut
    pub fn eq(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, Cmp::Eq, value)
    }

    /// Membership shortcut
    pub fn within(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(column, Cmp::In, Value::Array(values))
    }

    pub fn group(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn having(mut self, column: impl Into<String>, cmp: Cmp, value: Value) -> Self {
        self.having.push(Condition {
            column: column.into(),
            cmp,
            value,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn random(mut self) -> Self {
        self.random_order = true;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Ask the storage layer for the total matching-row count alongside the page
    pub fn count_total(mut self) -> Self {
        self.count_total = true;
        self
    }
}
