//! Error types for the caching library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for all cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or otherwise unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Operation does not match the type of the stored value
    #[error("Type mismatch for key '{key}': {detail}")]
    TypeMismatch {
        /// Key whose stored value has the wrong shape
        key: String,
        /// What was expected versus what was found
        detail: String,
    },

    /// Invalid configuration detected at construction time
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Value cannot round-trip through the serializer
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The distributed cache backend reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// The message bus reported a failure
    #[error("Message bus error: {0}")]
    Bus(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Builds a `TypeMismatch` error for the given key.
    pub fn type_mismatch(key: &str, detail: impl Into<String>) -> Self {
        CacheError::TypeMismatch {
            key: key.to_string(),
            detail: detail.into(),
        }
    }
}
