//! The prefs engine.
//!
//! Syncs the single prefs record. There is no per-preference diffing: the
//! record has either changed locally or it has not, and the whole record is
//! uploaded or applied as one unit.
//!
//! # Example
//!
//! ```ignore
//! let prefs: Arc<dyn PrefService> = Arc::new(MemoryPrefs::new());
//! let engine = PrefsEngine::new(prefs, themes, APP_ID, EngineConfig::default())?;
//! engine.tracker().start();
//!
//! let mut round = engine.start_round().await?;
//! for item in downloaded {
//!     engine.apply_incoming(&mut round, &item, &SyncClock::system(server_time)).await?;
//! }
//! for id in round.changed_ids().keys() {
//!     upload(engine.create_outgoing(id).await?);
//! }
//! engine.finish_round(round, server_time);
//! ```

use async_trait::async_trait;
use prefs_types::{IncomingRecord, PrefRecord, RecordId, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::filter::PrefFilter;
use crate::flag::{PersistedFlag, PrefFlag};
use crate::framework::{
    ChangedIds, Engine, EngineBase, IgnoreAllGuard, Store, SyncClock, SyncRound, Tracker,
};
use crate::prefs::PrefService;
use crate::store::PrefStore;
use crate::theme::ThemeManager;
use crate::tracker::PrefTracker;

/// Engine name.
pub const ENGINE_NAME: &str = "prefs";
/// Record format version.
pub const ENGINE_VERSION: u32 = 2;
/// Prefs sync before other collections.
pub const SYNC_PRIORITY: u32 = 1;

/// Sync engine for the "all prefs" record.
pub struct PrefsEngine {
    base: EngineBase,
    store: PrefStore,
    tracker: PrefTracker,
    record_id: RecordId,
    just_wiped: AtomicBool,
}

impl PrefsEngine {
    /// Create an engine for the install `install_id`.
    ///
    /// The modified flag is persisted in `prefs` under
    /// [`EngineConfig::modified_pref`].
    pub fn new(
        prefs: Arc<dyn PrefService>,
        themes: Arc<dyn ThemeManager>,
        install_id: &str,
        config: EngineConfig,
    ) -> CoreResult<Self> {
        let modified = Arc::new(PrefFlag::new(prefs.clone(), config.modified_pref.clone()));
        Self::with_flag(
            prefs,
            themes,
            modified,
            RecordId::from_install_id(install_id),
            config,
        )
    }

    /// Create an engine with an explicit modified flag and record id.
    pub fn with_flag(
        prefs: Arc<dyn PrefService>,
        themes: Arc<dyn ThemeManager>,
        modified: Arc<dyn PersistedFlag>,
        record_id: RecordId,
        config: EngineConfig,
    ) -> CoreResult<Self> {
        let filter = PrefFilter::new(prefs.clone(), &config)?;
        let tracker = PrefTracker::new(
            prefs.clone(),
            filter.clone(),
            modified,
            config.score_increment,
        );
        let store = PrefStore::new(
            prefs,
            filter,
            themes,
            record_id.clone(),
            config.collection.clone(),
            config.theme_pref,
        );

        Ok(Self {
            base: EngineBase::new(ENGINE_NAME, config.collection),
            store,
            tracker,
            record_id,
            just_wiped: AtomicBool::new(false),
        })
    }

    /// The fixed record id.
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Shared engine state.
    pub fn base(&self) -> &EngineBase {
        &self.base
    }

    /// The record store.
    pub fn store(&self) -> &PrefStore {
        &self.store
    }

    /// The change tracker.
    pub fn tracker(&self) -> &PrefTracker {
        &self.tracker
    }

    /// Whether the next reconciliation accepts unconditionally.
    pub fn just_wiped(&self) -> bool {
        self.just_wiped.load(Ordering::SeqCst)
    }

    /// Begin a round: snapshot changed ids and the tracker's change epoch.
    pub async fn start_round(&self) -> Result<SyncRound> {
        let epoch = self.tracker.change_epoch();
        let changed = self.get_changed_ids().await?;
        Ok(SyncRound::new(changed, epoch))
    }

    /// Complete a successful round.
    ///
    /// Clears the modified flag unless a relevant change arrived while the
    /// round was in flight. Returns whether it was cleared.
    pub fn finish_round(&self, round: SyncRound, server_time: f64) -> bool {
        self.base.set_last_sync(server_time);
        let cleared = self.tracker.clear_changed_ids_since(round.epoch());
        if !cleared {
            tracing::debug!("Prefs changed during sync, keeping record marked");
        }
        cleared
    }

    /// Profile is going away: stop observing preferences.
    pub fn shutdown(&self) {
        self.tracker.stop();
    }
}

#[async_trait]
impl Engine for PrefsEngine {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn version(&self) -> u32 {
        ENGINE_VERSION
    }

    fn sync_priority(&self) -> u32 {
        SYNC_PRIORITY
    }

    fn allow_skipped_record(&self) -> bool {
        false
    }

    async fn get_changed_ids(&self) -> Result<ChangedIds> {
        // No local timestamp is kept; nothing resolves conflicts below the
        // whole-record level.
        let mut changed = ChangedIds::new();
        if self.tracker.modified() {
            changed.insert(self.record_id.clone(), 0.0);
        }
        Ok(changed)
    }

    async fn create_outgoing(&self, id: &RecordId) -> Result<PrefRecord> {
        self.store.create_record(id).await
    }

    async fn reconcile(
        &self,
        round: &mut SyncRound,
        item: &IncomingRecord,
        clock: &SyncClock,
    ) -> Result<bool> {
        // Nothing local survives a wipe, so whatever the server has wins.
        if self.just_wiped.swap(false, Ordering::SeqCst) {
            tracing::debug!("Accepting {} unconditionally after wipe", item.id());
            return Ok(true);
        }
        self.base
            .default_reconcile(&self.store, round, item, clock)
            .await
    }

    async fn apply_incoming(
        &self,
        round: &mut SyncRound,
        item: &IncomingRecord,
        clock: &SyncClock,
    ) -> Result<bool> {
        if !self.reconcile(round, item, clock).await? {
            tracing::debug!("Skipping incoming record {}", item.id());
            return Ok(false);
        }

        let _ignore = IgnoreAllGuard::new(&self.tracker);
        self.base.default_apply(&self.store, item).await?;
        tracing::debug!("Applied incoming record {}", item.id());
        Ok(true)
    }

    async fn wipe_client(&self) -> Result<()> {
        self.base
            .default_wipe_client(&self.store, &self.tracker)
            .await?;
        self.just_wiped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
