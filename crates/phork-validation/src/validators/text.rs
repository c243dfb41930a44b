//! String validator: type, pattern, character-count bounds

use crate::error::ValidationError;
use serde_json::Value;

pub fn check(
    field: &str,
    value: &Value,
    pattern: Option<&str>,
    min_length: Option<usize>,
    max_length: Option<usize>,
) -> Result<(), ValidationError> {
    let Some(text) = value.as_str() else {
        return Err(ValidationError::with_code(
            field,
            format!("{} must be a string", field),
            "string",
        ));
    };

    if let Some(pattern) = pattern {
        let regex = regex::Regex::new(pattern).map_err(|_| {
            ValidationError::with_code(
                field,
                format!("{} has an invalid validation pattern", field),
                "pattern",
            )
        })?;
        if !regex.is_match(text) {
            return Err(ValidationError::with_code(
                field,
                format!("{} has an invalid format", field),
                "pattern",
            ));
        }
    }

    let chars = text.chars().count();
    if let Some(min) = min_length {
        if chars < min {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at least {} characters", field, min),
                "min_length",
            ));
        }
    }
    if let Some(max) = max_length {
        if chars > max {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at most {} characters", field, max),
                "max_length",
            ));
        }
    }

    Ok(())
}
