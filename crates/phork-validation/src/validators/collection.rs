//! List and map validators

use crate::error::ValidationError;
use serde_json::Value;

pub fn check_list(
    field: &str,
    value: &Value,
    min_items: Option<usize>,
    max_items: Option<usize>,
) -> Result<(), ValidationError> {
    let Some(items) = value.as_array() else {
        return Err(ValidationError::with_code(
            field,
            format!("{} must be a list", field),
            "list",
        ));
    };

    if let Some(min) = min_items {
        if items.len() < min {
            return Err(ValidationError::with_code(
                field,
                format!("{} must have at least {} items", field, min),
                "min_items",
            ));
        }
    }
    if let Some(max) = max_items {
        if items.len() > max {
            return Err(ValidationError::with_code(
                field,
                format!("{} must have at most {} items", field, max),
                "max_items",
            ));
        }
    }

    Ok(())
}

pub fn check_map(field: &str, value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::with_code(
            field,
            format!("{} must be an object", field),
            "map",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_type_and_bounds() {
        assert!(check_list("tags", &json!(["a", "b"]), Some(1), Some(3)).is_ok());
        assert!(check_list("tags", &json!("a"), None, None).is_err());
        assert!(check_list("tags", &json!(["a"]), Some(2), None).is_err());
        assert!(check_list("tags", &json!(["a", "b"]), None, Some(1)).is_err());
    }

    #[test]
    fn test_map_type() {
        assert!(check_map("meta", &json!({"k": 1})).is_ok());
        assert!(check_map("meta", &json!([1])).is_err());
        assert!(check_map("meta", &json!("x")).is_err());
    }
}
