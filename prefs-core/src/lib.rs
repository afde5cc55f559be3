//! # prefs-core
//!
//! Preferences sync engine for prefsync.
//!
//! Every preference a user opted into syncing travels in one record per
//! install. This crate decides which preferences qualify, snapshots and
//! applies them, tracks local edits, and reconciles incoming records.
//!
//! ## Layout
//!
//! - [`filter`] - control flags and unsafe URL values
//! - [`store`] - building and applying the record snapshot
//! - [`tracker`] - watching local edits and the persisted modified flag
//! - [`engine`] - the prefs engine on top of the [`framework`] seams
//!
//! The host supplies the preference backend through [`PrefService`] and
//! theme switching through [`ThemeManager`]. [`MemoryPrefs`] is a complete
//! in-memory backend for tests and headless use.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod flag;
pub mod framework;
pub mod prefs;
pub mod store;
pub mod theme;
pub mod tracker;

pub use config::{ConfigError, EngineConfig};
pub use engine::PrefsEngine;
pub use error::{CoreError, CoreResult};
pub use filter::PrefFilter;
pub use flag::{MemoryFlag, PersistedFlag, PrefFlag};
pub use framework::{
    ChangedIds, Engine, EngineBase, IgnoreAllGuard, Store, SyncClock, SyncRound, Tracker,
    SCORE_INCREMENT_MEDIUM, SCORE_INCREMENT_SMALL, SCORE_INCREMENT_XLARGE,
};
pub use prefs::{MemoryPrefs, PrefChange, PrefObserver, PrefService, Subscription};
pub use store::PrefStore;
pub use theme::ThemeManager;
pub use tracker::{PrefTracker, TrackerState};
