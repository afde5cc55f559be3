//! Configuration loading for the prefs engine.
//!
//! Every field is optional in TOML; missing fields fall back to the values
//! desktop clients use, so an empty file is a valid configuration.

use prefs_types::DEFAULT_COLLECTION;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::framework::SCORE_INCREMENT_XLARGE;

/// Prefs engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Namespace of the control flags (default: `services.sync.prefs.sync.`).
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,
    /// Boolean pref that persists the tracker's "modified" state.
    #[serde(default = "default_modified_pref")]
    pub modified_pref: String,
    /// Pref routed through the theme manager instead of being assigned.
    #[serde(default = "default_theme_pref")]
    pub theme_pref: String,
    /// URL schemes that are never synced in either direction.
    #[serde(default = "default_unsafe_schemes")]
    pub unsafe_schemes: Vec<String>,
    /// Score added per sync-relevant change (default: 300).
    #[serde(default = "default_score_increment")]
    pub score_increment: u32,
    /// Server collection name (default: `prefs`).
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_control_prefix() -> String {
    "services.sync.prefs.sync.".to_string()
}

fn default_modified_pref() -> String {
    "services.sync.engine.prefs.modified".to_string()
}

fn default_theme_pref() -> String {
    "lightweightThemes.selectedThemeID".to_string()
}

fn default_unsafe_schemes() -> Vec<String> {
    vec!["moz-extension".to_string(), "blob".to_string()]
}

fn default_score_increment() -> u32 {
    SCORE_INCREMENT_XLARGE
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_prefix: default_control_prefix(),
            modified_pref: default_modified_pref(),
            theme_pref: default_theme_pref(),
            unsafe_schemes: default_unsafe_schemes(),
            score_increment: default_score_increment(),
            collection: default_collection(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "control_prefix must not be empty".to_string(),
            ));
        }
        if self.unsafe_schemes.is_empty() || self.unsafe_schemes.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid(
                "unsafe_schemes must list at least one non-empty scheme".to_string(),
            ));
        }
        if self.collection.is_empty() {
            return Err(ConfigError::Invalid("collection must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Configuration parsed but is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
