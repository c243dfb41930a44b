//! Email address validator.
//!
//! RFC-approximate pattern check only; MX probing is a network concern and
//! stays outside this crate.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*\.[a-z]{2,}$")
        .expect("email pattern is valid")
});

pub fn check(field: &str, value: &Value) -> Result<(), ValidationError> {
    let valid = value
        .as_str()
        .map(|text| EMAIL_PATTERN.is_match(text))
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(ValidationError::with_code(
            field,
            format!("{} must be a valid email address", field),
            "email",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_common_addresses() {
        for address in [
            "user@example.com",
            "first.last+tag@sub.example.co.uk",
            "UPPER@EXAMPLE.ORG",
        ] {
            assert!(check("email", &json!(address)).is_ok(), "address: {}", address);
        }
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for address in [
            "plainaddress",
            "@missing-local.com",
            "user@",
            "user@nodot",
            "user@-bad.com",
            "user@example.com ",
        ] {
            assert!(check("email", &json!(address)).is_err(), "address: {}", address);
        }
    }

    #[test]
    fn test_rejects_non_strings() {
        assert!(check("email", &json!(42)).is_err());
    }
}
