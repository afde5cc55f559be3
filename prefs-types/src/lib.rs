//! # prefs-types
//!
//! Record and value types for the prefsync preferences engine.
//!
//! This crate provides the foundational types shared by the engine crates:
//! - [`PrefValue`], [`PrefType`] - Preference values as they travel in records
//! - [`RecordId`] - The fixed per-install identifier of the prefs record
//! - [`PrefRecord`], [`IncomingRecord`] - The single "all prefs" record
//! - [`PrefsError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod record;
mod value;

pub use error::{PrefsError, Result};
pub use ids::RecordId;
pub use record::{IncomingRecord, PrefMap, PrefRecord, DEFAULT_COLLECTION};
pub use value::{PrefType, PrefValue};
