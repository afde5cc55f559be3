//! Persisted boolean state.
//!
//! The tracker's "modified" bit must survive restarts, so it is injected as
//! a [`PersistedFlag`] rather than kept as a process-wide global. Two
//! trackers built with different flags never see each other's state.

use prefs_types::PrefValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::prefs::PrefService;

/// A boolean that outlives the engine instance.
pub trait PersistedFlag: Send + Sync {
    /// Current value (false when never written).
    fn get(&self) -> bool;

    /// Store a new value.
    fn set(&self, value: bool);
}

/// Flag stored as a boolean preference.
pub struct PrefFlag {
    prefs: Arc<dyn PrefService>,
    name: String,
}

impl PrefFlag {
    /// Back the flag with the preference `name`.
    pub fn new(prefs: Arc<dyn PrefService>, name: impl Into<String>) -> Self {
        Self {
            prefs,
            name: name.into(),
        }
    }

    /// Name of the backing preference.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PersistedFlag for PrefFlag {
    fn get(&self) -> bool {
        self.prefs.get_bool(&self.name, false)
    }

    fn set(&self, value: bool) {
        if let Err(e) = self.prefs.set(&self.name, PrefValue::Bool(value)) {
            tracing::warn!("Failed to persist flag {}: {}", self.name, e);
        }
    }
}

/// Flag kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryFlag(AtomicBool);

impl MemoryFlag {
    /// Create a flag with an initial value.
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }
}

impl PersistedFlag for MemoryFlag {
    fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}
