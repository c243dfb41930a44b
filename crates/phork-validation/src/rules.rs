//! Declarative field rules.
//!
//! A [`FieldRule`] bundles everything one field must satisfy: presence,
//! a [`ValueKind`] shape, a custom closure and an optional message override.
//! Uniqueness is declared here but enforced by the persistence layer, which
//! is the only place that can query for colliding rows.

use crate::error::{ValidationError, ValidationErrors};
use crate::validators;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Custom validation closure; falsy means the value is rejected.
pub type CustomCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The shape a field value must have, one variant per validator.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Text {
        pattern: Option<String>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    List {
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Map,
    Email,
    DateTime,
}

impl ValueKind {
    pub fn text() -> Self {
        Self::Text {
            pattern: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn integer() -> Self {
        Self::Integer {
            min: None,
            max: None,
        }
    }

    pub fn float() -> Self {
        Self::Float {
            min: None,
            max: None,
        }
    }

    pub fn list() -> Self {
        Self::List {
            min_items: None,
            max_items: None,
        }
    }

    /// Integer lower bound (no-op on other variants)
    pub fn min(mut self, value: i64) -> Self {
        if let Self::Integer { min, .. } = &mut self {
            *min = Some(value);
        }
        self
    }

    /// Integer upper bound (no-op on other variants)
    pub fn max(mut self, value: i64) -> Self {
        if let Self::Integer { max, .. } = &mut self {
            *max = Some(value);
        }
        self
    }

    /// Float lower bound (no-op on other variants)
    pub fn min_f(mut self, value: f64) -> Self {
        if let Self::Float { min, .. } = &mut self {
            *min = Some(value);
        }
        self
    }

    /// Float upper bound (no-op on other variants)
    pub fn max_f(mut self, value: f64) -> Self {
        if let Self::Float { max, .. } = &mut self {
            *max = Some(value);
        }
        self
    }

    /// Text pattern the value must match (no-op on other variants)
    pub fn pattern(mut self, regex: impl Into<String>) -> Self {
        if let Self::Text { pattern, .. } = &mut self {
            *pattern = Some(regex.into());
        }
        self
    }

    /// Minimum character count (no-op on other variants)
    pub fn min_length(mut self, length: usize) -> Self {
        if let Self::Text { min_length, .. } = &mut self {
            *min_length = Some(length);
        }
        self
    }

    /// Maximum character count (no-op on other variants)
    pub fn max_length(mut self, length: usize) -> Self {
        if let Self::Text { max_length, .. } = &mut self {
            *max_length = Some(length);
        }
        self
    }

    /// Minimum element count (no-op on other variants)
    pub fn min_items(mut self, count: usize) -> Self {
        if let Self::List { min_items, .. } = &mut self {
            *min_items = Some(count);
        }
        self
    }

    /// Maximum element count (no-op on other variants)
    pub fn max_items(mut self, count: usize) -> Self {
        if let Self::List { max_items, .. } = &mut self {
            *max_items = Some(count);
        }
        self
    }
}

/// Whether a value counts as empty for required/skip checks.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Everything one field must satisfy before a save may proceed.
#[derive(Clone)]
pub struct FieldRule {
    pub field: String,
    pub required: bool,
    pub disabled: bool,
    pub unique: bool,
    pub kind: Option<ValueKind>,
    pub custom: Option<CustomCheck>,
    pub message: Option<String>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            required: false,
            disabled: false,
            unique: false,
            kind: None,
            custom: None,
            message: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn custom(mut self, check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.custom = Some(Arc::new(check));
        self
    }

    /// Override every message this rule produces
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Evaluate a value against this rule.
    ///
    /// Order mirrors the save pipeline: a missing required value fails the
    /// field outright; the custom check always runs; an empty non-required
    /// value is otherwise valid; the kind check runs last. Uniqueness is not
    /// evaluated here.
    pub fn check(&self, value: &Value) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.disabled {
            return errors;
        }

        if self.required && is_empty(value) {
            errors.add(ValidationError::with_code(
                &self.field,
                format!("{} is required", self.field),
                "required",
            ));
            return self.apply_message(errors);
        }

        if let Some(custom) = &self.custom {
            if !custom(value) {
                errors.add(ValidationError::with_code(
                    &self.field,
                    format!("{} is invalid", self.field),
                    "custom",
                ));
            }
        }

        if is_empty(value) {
            return self.apply_message(errors);
        }

        if let Some(kind) = &self.kind {
            if let Err(error) = validators::check_kind(kind, &self.field, value) {
                errors.add(error);
            }
        }

        self.apply_message(errors)
    }

    fn apply_message(&self, errors: ValidationErrors) -> ValidationErrors {
        let Some(message) = &self.message else {
            return errors;
        };
        let mut replaced = ValidationErrors::new();
        for mut error in errors {
            error.message = message.clone();
            replaced.add(error);
        }
        replaced
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("field", &self.field)
            .field("required", &self.required)
            .field("disabled", &self.disabled)
            .field("unique", &self.unique)
            .field("kind", &self.kind)
            .field("custom", &self.custom.as_ref().map(|_| "<fn>"))
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_empty_fails() {
        let rule = FieldRule::new("title").required();

        for value in [json!(null), json!(""), json!([])] {
            let errors = rule.check(&value);
            assert!(errors.has_field_errors("title"), "value: {}", value);
            assert_eq!(errors.iter().next().unwrap().code, "required");
        }
    }

    #[test]
    fn test_optional_empty_is_valid() {
        let rule = FieldRule::new("title").kind(ValueKind::text().min_length(5));
        assert!(rule.check(&json!(null)).is_empty());
        assert!(rule.check(&json!("")).is_empty());
    }

    #[test]
    fn test_disabled_rule_never_fails() {
        let rule = FieldRule::new("title").required().disabled();
        assert!(rule.check(&json!(null)).is_empty());
    }

    #[test]
    fn test_custom_check_runs_on_empty_values() {
        let rule = FieldRule::new("slug").custom(|v| !v.is_null());
        let errors = rule.check(&json!(null));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().code, "custom");
    }

    #[test]
    fn test_custom_and_kind_both_report() {
        let rule = FieldRule::new("age")
            .custom(|_| false)
            .kind(ValueKind::integer());

        let errors = rule.check(&json!("abc"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_message_override() {
        let rule = FieldRule::new("age")
            .required()
            .message("age looks wrong");

        let errors = rule.check(&json!(null));
        assert_eq!(errors.iter().next().unwrap().message, "age looks wrong");
    }

    #[test]
    fn test_kind_builders() {
        let kind = ValueKind::integer().min(0).max(120);
        assert_eq!(
            kind,
            ValueKind::Integer {
                min: Some(0),
                max: Some(120)
            }
        );

        let kind = ValueKind::text().pattern("^a").min_length(1).max_length(3);
        assert_eq!(
            kind,
            ValueKind::Text {
                pattern: Some("^a".to_string()),
                min_length: Some(1),
                max_length: Some(3)
            }
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(is_empty(&json!(null)));
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(false)));
        assert!(!is_empty(&json!("0")));
    }
}
