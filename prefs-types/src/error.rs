//! Error types for prefsync.

use thiserror::Error;

use crate::PrefType;

/// Errors that can occur in prefsync operations.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// The preference already exists with a different type.
    #[error("type mismatch for pref {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Full preference name.
        name: String,
        /// Type of the existing preference.
        expected: PrefType,
        /// Type of the rejected value.
        actual: PrefType,
    },

    /// JSON (de)serialization of a record failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record payload was structurally invalid
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type alias for prefsync operations.
pub type Result<T> = std::result::Result<T, PrefsError>;
