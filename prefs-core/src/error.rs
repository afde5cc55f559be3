//! Error types for prefs-core.

use crate::config::ConfigError;

/// Errors raised while assembling the prefs engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The unsafe-scheme pattern could not be compiled.
    #[error("invalid unsafe scheme pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type alias for engine assembly.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
