//! # phork-validation
//!
//! Declarative field validation for the phork framework. A [`FieldRule`]
//! describes what a field must look like; [`FieldRule::check`] evaluates a
//! value against it and reports human-readable [`ValidationError`]s.
//!
//! ```rust
//! use phork_validation::{FieldRule, ValueKind};
//! use serde_json::json;
//!
//! let rule = FieldRule::new("age")
//!     .required()
//!     .kind(ValueKind::integer().min(0).max(120));
//!
//! assert!(rule.check(&json!(42)).is_empty());
//! assert!(!rule.check(&json!("abc")).is_empty());
//! ```

pub mod error;
pub mod rules;
pub mod validators;

pub use error::{ValidationError, ValidationErrors};
pub use rules::{is_empty, FieldRule, ValueKind};
