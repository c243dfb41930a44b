//! Integer and float validators

use crate::error::ValidationError;
use serde_json::Value;

/// A value is an integer when it is a whole JSON number or a string whose
/// integer parse round-trips to the identical text. The round-trip rejects
/// leading zeros, whitespace and trailing garbage.
pub fn check_integer(
    field: &str,
    value: &Value,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<(), ValidationError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text
            .parse::<i64>()
            .ok()
            .filter(|n| n.to_string() == *text),
        _ => None,
    };

    let Some(number) = parsed else {
        return Err(ValidationError::with_code(
            field,
            format!("{} must be an integer", field),
            "integer",
        ));
    };

    if let Some(min) = min {
        if number < min {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at least {}", field, min),
                "min_value",
            ));
        }
    }
    if let Some(max) = max {
        if number > max {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at most {}", field, max),
                "max_value",
            ));
        }
    }

    Ok(())
}

/// Integer-shaped values are accepted as floats; only an f64 parse failure
/// or a bounds violation rejects.
pub fn check_float(
    field: &str,
    value: &Value,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(), ValidationError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    };

    let Some(number) = parsed else {
        return Err(ValidationError::with_code(
            field,
            format!("{} must be a number", field),
            "float",
        ));
    };

    if let Some(min) = min {
        if number < min {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at least {}", field, min),
                "min_value",
            ));
        }
    }
    if let Some(max) = max {
        if number > max {
            return Err(ValidationError::with_code(
                field,
                format!("{} must be at most {}", field, max),
                "max_value",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_accepts_numbers_and_clean_strings() {
        assert!(check_integer("age", &json!(42), None, None).is_ok());
        assert!(check_integer("age", &json!(-3), None, None).is_ok());
        assert!(check_integer("age", &json!("42"), None, None).is_ok());
        assert!(check_integer("age", &json!("-3"), None, None).is_ok());
    }

    #[test]
    fn test_integer_rejects_garbage() {
        for value in [
            json!("abc"),
            json!("42abc"),
            json!(" 42"),
            json!("042"),
            json!("4.2"),
            json!(4.2),
            json!(true),
        ] {
            assert!(check_integer("age", &value, None, None).is_err(), "value: {}", value);
        }
    }

    #[test]
    fn test_integer_bounds() {
        assert!(check_integer("age", &json!(0), Some(0), Some(120)).is_ok());
        assert!(check_integer("age", &json!(-1), Some(0), Some(120)).is_err());
        assert!(check_integer("age", &json!(121), Some(0), Some(120)).is_err());
    }

    #[test]
    fn test_float_accepts_integer_shaped_values() {
        assert!(check_float("price", &json!(3), None, None).is_ok());
        assert!(check_float("price", &json!("3"), None, None).is_ok());
        assert!(check_float("price", &json!("3.0"), None, None).is_ok());
        assert!(check_float("price", &json!(3.25), None, None).is_ok());
    }

    #[test]
    fn test_float_rejects_non_numbers() {
        assert!(check_float("price", &json!("abc"), None, None).is_err());
        assert!(check_float("price", &json!("1.2.3"), None, None).is_err());
        assert!(check_float("price", &json!([1.0]), None, None).is_err());
    }

    #[test]
    fn test_float_bounds() {
        assert!(check_float("price", &json!(9.99), Some(0.0), Some(10.0)).is_ok());
        assert!(check_float("price", &json!(-0.5), Some(0.0), None).is_err());
        assert!(check_float("price", &json!(10.5), None, Some(10.0)).is_err());
    }
}
