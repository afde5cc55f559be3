//! Which preferences take part in sync.
//!
//! A preference `foo` syncs when its control flag `<prefix>foo` is true.
//! Control flags themselves always sync, so opting a preference in or out
//! on one client propagates to the others.
//!
//! Independently of opt-in, string values pointing at extension-internal
//! or blob URLs are never synced: they are meaningless on another client.

use prefs_types::{PrefType, PrefValue};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::prefs::PrefService;

/// Eligibility and safety decisions for preference names and values.
#[derive(Clone)]
pub struct PrefFilter {
    prefs: Arc<dyn PrefService>,
    control_prefix: String,
    unsafe_url: Regex,
}

impl PrefFilter {
    /// Build a filter from configuration.
    pub fn new(prefs: Arc<dyn PrefService>, config: &EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        let schemes: Vec<String> = config
            .unsafe_schemes
            .iter()
            .map(|s| regex::escape(s))
            .collect();
        let unsafe_url = RegexBuilder::new(&format!("^(?:{}):", schemes.join("|")))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            prefs,
            control_prefix: config.control_prefix.clone(),
            unsafe_url,
        })
    }

    /// The control flag namespace.
    pub fn control_prefix(&self) -> &str {
        &self.control_prefix
    }

    /// Whether `name` is itself a control flag.
    pub fn is_control_flag(&self, name: &str) -> bool {
        name.starts_with(&self.control_prefix)
    }

    /// Name of the control flag governing `name`.
    pub fn control_flag_name(&self, name: &str) -> String {
        format!("{}{}", self.control_prefix, name)
    }

    /// Whether `name` may be read into or written from a record.
    pub fn is_eligible(&self, name: &str) -> bool {
        self.is_control_flag(name) || self.prefs.get_bool(&self.control_flag_name(name), false)
    }

    /// Whether `value` is a string naming an unsafe URL scheme.
    pub fn is_unsafe_value(&self, value: &PrefValue) -> bool {
        match value {
            PrefValue::String(s) => self.unsafe_url.is_match(s),
            _ => false,
        }
    }

    /// Whether the current local value of `name` is unsafe.
    ///
    /// Only string preferences can be unsafe.
    pub fn is_unsafe_pref(&self, name: &str) -> bool {
        if self.prefs.pref_type(name) != Some(PrefType::String) {
            return false;
        }
        self.prefs
            .get(name)
            .is_some_and(|value| self.is_unsafe_value(&value))
    }

    /// Candidate names for the outgoing record.
    ///
    /// Every existing control flag, whatever its value, followed by each
    /// opted-in preference whose current value is safe. Callers still check
    /// [`is_eligible`](Self::is_eligible) per name.
    pub fn syncable_pref_names(&self) -> Vec<String> {
        let governed = self.prefs.child_list(&self.control_prefix);

        // Flags are listed before the unsafe check, so a flag still syncs when
        // its governed value is withheld.
        let mut names: Vec<String> = governed
            .iter()
            .map(|name| self.control_flag_name(name))
            .collect();
        names.extend(
            governed
                .into_iter()
                .filter(|name| self.is_eligible(name) && !self.is_unsafe_pref(name)),
        );
        names
    }
}
