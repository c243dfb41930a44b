//! Error types for the model layer.
//!
//! Only structural misconfiguration and infrastructure faults surface as
//! `Err`. Business-rule failures (validation, vetoed saves, failed backups)
//! travel through the [`crate::report::ErrorChannel`] and a `false` return,
//! so callers can present them uniformly.

use thiserror::Error;

/// Result type alias for model operations
pub type OrmResult<T> = Result<T, OrmError>;

#[derive(Error, Debug)]
pub enum OrmError {
    /// Missing or contradictory configuration; a programmer error, never
    /// expected at runtime under a correct setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage backend failure
    #[error("Database error: {0}")]
    Database(String),

    /// An event was run with `fatal_if_missing` and had no subscriptions
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] phork_cache::CacheError),
}
