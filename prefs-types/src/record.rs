//! The prefs record - the single unit exchanged with the server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{PrefValue, PrefsError, RecordId, Result};

/// Collection the prefs record lives in.
pub const DEFAULT_COLLECTION: &str = "prefs";

/// Preference name to value. `None` means "unset locally, use the default".
pub type PrefMap = BTreeMap<String, Option<PrefValue>>;

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The "all preferences" record.
///
/// The collection name is routing metadata owned by the caller and is not
/// part of the cleartext payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Collection this record belongs to.
    #[serde(skip, default = "default_collection")]
    pub collection: String,
    /// Synced preferences.
    #[serde(default)]
    pub value: PrefMap,
    /// Tombstone marker.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl PrefRecord {
    /// Create an empty, live record.
    pub fn new(id: RecordId, collection: impl Into<String>) -> Self {
        Self {
            id,
            collection: collection.into(),
            value: PrefMap::new(),
            deleted: false,
        }
    }

    /// Create a tombstone for `id`.
    pub fn tombstone(id: RecordId, collection: impl Into<String>) -> Self {
        Self {
            deleted: true,
            ..Self::new(id, collection)
        }
    }

    /// Whether two records carry the same payload, ignoring routing metadata.
    pub fn same_payload(&self, other: &PrefRecord) -> bool {
        self.id == other.id && self.deleted == other.deleted && self.value == other.value
    }

    /// Serialize the cleartext payload to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a cleartext payload received from `collection`.
    pub fn from_json(json: &str, collection: impl Into<String>) -> Result<Self> {
        let mut record: Self = serde_json::from_str(json)?;
        if record.id.as_str().is_empty() {
            return Err(PrefsError::InvalidRecord("record has no id".into()));
        }
        record.collection = collection.into();
        Ok(record)
    }
}

/// A record downloaded from the server, with its server-side timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRecord {
    /// The decrypted record.
    pub record: PrefRecord,
    /// Server modification time, in seconds since the epoch.
    pub modified: f64,
}

impl IncomingRecord {
    /// Wrap a downloaded record.
    pub fn new(record: PrefRecord, modified: f64) -> Self {
        Self { record, modified }
    }

    /// Id of the wrapped record.
    pub fn id(&self) -> &RecordId {
        &self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrefsError;

    fn sample() -> PrefRecord {
        let mut record = PrefRecord::new(RecordId::new("guid"), DEFAULT_COLLECTION);
        record
            .value
            .insert("services.sync.prefs.sync.foo".into(), Some(true.into()));
        record.value.insert("foo".into(), Some(42.into()));
        record.value.insert("bar".into(), None);
        record
    }

    #[test]
    fn live_record_json_shape() {
        let json = sample().to_json().unwrap();
        assert_eq!(
            json,
            r#"{"id":"guid","value":{"bar":null,"foo":42,"services.sync.prefs.sync.foo":true}}"#
        );
    }

    #[test]
    fn tombstone_json_shape() {
        let json = PrefRecord::tombstone(RecordId::new("other"), DEFAULT_COLLECTION)
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"id":"other","value":{},"deleted":true}"#);
    }

    #[test]
    fn parse_assigns_collection() {
        let record = PrefRecord::from_json(r#"{"id":"guid","value":{"a":"b"}}"#, "custom").unwrap();
        assert_eq!(record.collection, "custom");
        assert_eq!(record.value.get("a"), Some(&Some(PrefValue::from("b"))));
        assert!(!record.deleted);
    }

    #[test]
    fn parse_without_value_is_empty() {
        let record = PrefRecord::from_json(r#"{"id":"guid","deleted":true}"#, "prefs").unwrap();
        assert!(record.deleted);
        assert!(record.value.is_empty());
    }

    #[test]
    fn parse_garbage_is_serialization_error() {
        let err = PrefRecord::from_json("not json", "prefs").unwrap_err();
        assert!(matches!(err, PrefsError::Serialization(_)));
    }

    #[test]
    fn parse_empty_id_is_invalid() {
        let err = PrefRecord::from_json(r#"{"id":"","value":{}}"#, "prefs").unwrap_err();
        assert!(matches!(err, PrefsError::InvalidRecord(_)));
    }

    #[test]
    fn same_payload_ignores_collection() {
        let a = sample();
        let mut b = sample();
        b.collection = "elsewhere".into();
        assert!(a.same_payload(&b));

        b.value.insert("foo".into(), Some(43.into()));
        assert!(!a.same_payload(&b));
    }
}
