//! Identity types for prefsync.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the single prefs record.
///
/// Every client of an account that runs the same application derives the
/// same id, so all of them read and write one record. Any other id refers
/// to a record that does not exist.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the record id from an opaque install/application identifier.
    ///
    /// URL-safe base64 (padded) of the identifier bytes.
    pub fn from_install_id(install_id: &str) -> Self {
        Self(URL_SAFE.encode(install_id.as_bytes()))
    }

    /// Wrap an id received from the server without re-deriving it.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
