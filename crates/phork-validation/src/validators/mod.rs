//! Value-kind validators, one checker per [`ValueKind`] variant.

use crate::error::ValidationError;
use crate::rules::ValueKind;
use serde_json::Value;

pub mod collection;
pub mod datetime;
pub mod email;
pub mod numeric;
pub mod text;

/// Dispatch a non-empty value to the checker for its declared kind.
pub fn check_kind(kind: &ValueKind, field: &str, value: &Value) -> Result<(), ValidationError> {
    match kind {
        ValueKind::Text {
            pattern,
            min_length,
            max_length,
        } => text::check(field, value, pattern.as_deref(), *min_length, *max_length),
        ValueKind::Integer { min, max } => numeric::check_integer(field, value, *min, *max),
        ValueKind::Float { min, max } => numeric::check_float(field, value, *min, *max),
        ValueKind::List {
            min_items,
            max_items,
        } => collection::check_list(field, value, *min_items, *max_items),
        ValueKind::Map => collection::check_map(field, value),
        ValueKind::Email => email::check(field, value),
        ValueKind::DateTime => datetime::check(field, value),
    }
}
