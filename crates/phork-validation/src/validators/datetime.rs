//! Datetime validator: exact `YYYY-MM-DD HH:MM:SS`

use crate::error::ValidationError;
use chrono::NaiveDateTime;
use serde_json::Value;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn check(field: &str, value: &Value) -> Result<(), ValidationError> {
    let valid = value
        .as_str()
        .map(|text| NaiveDateTime::parse_from_str(text, FORMAT).is_ok())
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::with_code(
            field,
            format!("{} must be a datetime in YYYY-MM-DD HH:MM:SS format", field),
            "datetime",
        ))
    }
}
