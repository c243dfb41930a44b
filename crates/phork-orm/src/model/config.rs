//! Static model configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes a model type: its name (used for event namespaces), backing
/// table, primary-key column and which columns each write touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub insert_columns: Vec<String>,
    pub update_columns: Vec<String>,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            insert_columns: Vec::new(),
            update_columns: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn insert_columns(mut self, columns: &[&str]) -> Self {
        self.insert_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn update_columns(mut self, columns: &[&str]) -> Self {
        self.update_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the same column list for inserts and updates
    pub fn columns(self, columns: &[&str]) -> Self {
        self.insert_columns(columns).update_columns(columns)
    }
}

/// The operation a model is currently performing, with its arguments.
///
/// Serialized form doubles as the identity of a load call for caching, which
/// is why it must be deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    pub function: String,
    pub args: Value,
}

impl CallContext {
    pub fn new(function: impl Into<String>, args: Value) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}
