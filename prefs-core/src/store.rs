//! Snapshot store for the prefs record.
//!
//! All synced preferences travel as one record under one fixed id. Reading
//! builds a flat `name -> value` map; writing applies such a map back onto
//! local storage one entry at a time.
//!
//! Applying never fails as a whole. An entry that is not opted in, carries
//! an unsafe URL, or is rejected by the preference backend is skipped and
//! the rest of the map still applies.

use async_trait::async_trait;
use prefs_types::{PrefMap, PrefRecord, PrefValue, RecordId, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::filter::PrefFilter;
use crate::framework::Store;
use crate::prefs::PrefService;
use crate::theme::ThemeManager;

/// Reads and writes the single "all prefs" record.
pub struct PrefStore {
    prefs: Arc<dyn PrefService>,
    filter: PrefFilter,
    themes: Arc<dyn ThemeManager>,
    record_id: RecordId,
    collection: String,
    theme_pref: String,
}

impl PrefStore {
    /// Create a store for the record `record_id` in `collection`.
    pub fn new(
        prefs: Arc<dyn PrefService>,
        filter: PrefFilter,
        themes: Arc<dyn ThemeManager>,
        record_id: RecordId,
        collection: impl Into<String>,
        theme_pref: impl Into<String>,
    ) -> Self {
        Self {
            prefs,
            filter,
            themes,
            record_id,
            collection: collection.into(),
            theme_pref: theme_pref.into(),
        }
    }

    /// The fixed record id.
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// The eligibility filter in use.
    pub fn filter(&self) -> &PrefFilter {
        &self.filter
    }

    /// Read every eligible, safe preference.
    ///
    /// Preferences left at their default map to `None`.
    pub fn build_snapshot(&self) -> PrefMap {
        let mut values = PrefMap::new();
        for name in self.filter.syncable_pref_names() {
            if !self.filter.is_eligible(&name) || self.filter.is_unsafe_pref(&name) {
                continue;
            }
            let value = if self.prefs.is_set(&name) {
                self.prefs.get(&name)
            } else {
                None
            };
            values.insert(name, value);
        }
        values
    }

    /// Apply an incoming snapshot to local preferences.
    pub fn apply_snapshot(&self, values: &PrefMap) {
        let theme_before = self.prefs.get(&self.theme_pref);
        let mut theme_after = theme_before.clone();

        // A new client has no local flags yet, so flags must land before the
        // preferences they govern or those would be rejected as ineligible.
        let (flags, governed): (Vec<_>, Vec<_>) = values
            .iter()
            .partition(|(name, _)| self.filter.is_control_flag(name));

        for (name, value) in flags.into_iter().chain(governed) {
            if !self.filter.is_eligible(name) {
                continue;
            }

            if let Some(v) = value {
                if self.filter.is_unsafe_value(v) {
                    tracing::trace!("Skipping incoming unsyncable url for pref: {}", name);
                    continue;
                }
            }

            if *name == self.theme_pref {
                theme_after = value.clone();
                continue;
            }

            match value {
                // Gone missing remotely: fall back to the default.
                None => self.prefs.reset(name),
                Some(v) => {
                    if let Err(e) = self.prefs.set(name, v.clone()) {
                        tracing::trace!("Failed to set pref {}: {}", name, e);
                    }
                }
            }
        }

        if theme_before != theme_after {
            let theme_id = theme_after
                .as_ref()
                .and_then(PrefValue::as_str)
                .filter(|id| !id.is_empty());
            tracing::debug!("Selected theme changed, activating {:?}", theme_id);
            self.themes.activate_theme(theme_id);
        }
    }
}

#[async_trait]
impl Store for PrefStore {
    async fn create_record(&self, id: &RecordId) -> Result<PrefRecord> {
        if *id != self.record_id {
            return Ok(PrefRecord::tombstone(id.clone(), self.collection.clone()));
        }
        let mut record = PrefRecord::new(id.clone(), self.collection.clone());
        record.value = self.build_snapshot();
        Ok(record)
    }

    async fn update(&self, record: &PrefRecord) -> Result<()> {
        // Records for other applications share the collection; leave them be.
        if record.id != self.record_id {
            return Ok(());
        }
        tracing::trace!("Received pref updates, applying...");
        self.apply_snapshot(&record.value);
        Ok(())
    }

    async fn create(&self, _record: &PrefRecord) -> Result<()> {
        tracing::trace!("Ignoring create request");
        Ok(())
    }

    async fn remove(&self, _record: &PrefRecord) -> Result<()> {
        tracing::trace!("Ignoring remove request");
        Ok(())
    }

    async fn wipe(&self) -> Result<()> {
        tracing::trace!("Ignoring wipe request");
        Ok(())
    }

    async fn change_item_id(&self, _old_id: &RecordId, _new_id: &RecordId) -> Result<()> {
        tracing::trace!("PrefStore GUID is constant!");
        Ok(())
    }

    async fn get_all_ids(&self) -> Result<BTreeSet<RecordId>> {
        Ok(BTreeSet::from([self.record_id.clone()]))
    }

    async fn item_exists(&self, id: &RecordId) -> Result<bool> {
        Ok(*id == self.record_id)
    }
}
