//! Preference values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a stored preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefType {
    /// Boolean preference.
    Bool,
    /// Integer preference.
    Int,
    /// Floating point preference.
    Double,
    /// String preference.
    String,
}

impl fmt::Display for PrefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// A preference value as carried in a record.
///
/// Serialized untagged, so a record's JSON is a plain object of
/// `name -> true | 42 | 1.5 | "text" | null`. The `null` case is modelled as
/// `Option<PrefValue>::None` by the record map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// String value.
    String(String),
}

impl PrefValue {
    /// Type of this value.
    pub fn pref_type(&self) -> PrefType {
        match self {
            Self::Bool(_) => PrefType::Bool,
            Self::Int(_) => PrefType::Int,
            Self::Double(_) => PrefType::Double,
            Self::String(_) => PrefType::String,
        }
    }

    /// The boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PrefValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for PrefValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shapes() {
        let parsed: Vec<Option<PrefValue>> =
            serde_json::from_str(r#"[true, 42, 1.5, "dark", null]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Some(PrefValue::Bool(true)),
                Some(PrefValue::Int(42)),
                Some(PrefValue::Double(1.5)),
                Some(PrefValue::String("dark".into())),
                None,
            ]
        );
    }

    #[test]
    fn integers_do_not_become_doubles() {
        let v: PrefValue = serde_json::from_str("99").unwrap();
        assert_eq!(v.pref_type(), PrefType::Int);
    }

    #[test]
    fn accessors() {
        assert_eq!(PrefValue::from(true).as_bool(), Some(true));
        assert_eq!(PrefValue::from(1).as_bool(), None);
        assert_eq!(PrefValue::from("x").as_str(), Some("x"));
        assert_eq!(PrefValue::from(2.0).as_str(), None);
    }
}
