//! Engine framework seams.
//!
//! A sync engine is split into three capability sets:
//! - [`Store`]: turns local state into records and applies incoming ones
//! - [`Tracker`]: watches local edits and raises a score for the scheduler
//! - [`Engine`]: drives a round for one collection
//!
//! Behaviour shared by every engine (client reset, wipe, standard
//! reconciliation and apply) lives in [`EngineBase`]. Concrete engines hold one and
//! delegate to it explicitly when they do not override a step.
//!
//! ```text
//! scheduler ──score──► Tracker
//!     │
//!     └─► Engine::start_round ─► get_changed_ids
//!            │
//!            ├─► reconcile / apply_incoming ─► Store::{remove, create, update}
//!            ├─► create_outgoing ─► Store::create_record ─► transport
//!            └─► finish_round ─► Tracker::clear_changed_ids_since
//! ```

use async_trait::async_trait;
use prefs_types::{IncomingRecord, PrefRecord, PrefsError, RecordId, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Score for a minor change.
pub const SCORE_INCREMENT_SMALL: u32 = 1;
/// Score for a moderate change.
pub const SCORE_INCREMENT_MEDIUM: u32 = 10;
/// Score that by itself triggers a sync of every device.
pub const SCORE_INCREMENT_XLARGE: u32 = 300;

/// Record id to local modification time (seconds since the epoch).
pub type ChangedIds = BTreeMap<RecordId, f64>;

/// Time reference for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncClock {
    /// Server time reported with the last response, in seconds.
    pub server_time: f64,
    /// Local wall clock, in seconds.
    pub now: f64,
}

impl SyncClock {
    /// Create a clock from explicit readings.
    pub fn new(server_time: f64, now: f64) -> Self {
        Self { server_time, now }
    }

    /// Pair the server time with the local system clock.
    pub fn system(server_time: f64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self { server_time, now }
    }
}

/// State of one sync round, from changed-id computation to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRound {
    changed: ChangedIds,
    epoch: u64,
}

impl SyncRound {
    /// Start a round with the tracker's changed ids and change epoch.
    pub fn new(changed: ChangedIds, epoch: u64) -> Self {
        Self { changed, epoch }
    }

    /// Ids still pending upload.
    pub fn changed_ids(&self) -> &ChangedIds {
        &self.changed
    }

    /// Local modification time of `id`, if it is pending upload.
    pub fn local_modified(&self, id: &RecordId) -> Option<f64> {
        self.changed.get(id).copied()
    }

    /// Drop `id` from the upload set (the server already has it).
    pub fn mark_unchanged(&mut self, id: &RecordId) {
        self.changed.remove(id);
    }

    /// Tracker change epoch observed when the round started.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Local record storage for one collection.
#[async_trait]
pub trait Store: Send + Sync {
    /// Build the outgoing record for `id`; unknown ids yield a tombstone.
    async fn create_record(&self, id: &RecordId) -> Result<PrefRecord>;

    /// Apply an incoming record to local state.
    async fn update(&self, record: &PrefRecord) -> Result<()>;

    /// Create a new local item from an incoming record.
    async fn create(&self, record: &PrefRecord) -> Result<()>;

    /// Remove a local item named by an incoming tombstone.
    async fn remove(&self, record: &PrefRecord) -> Result<()>;

    /// Delete all local data for this collection.
    async fn wipe(&self) -> Result<()>;

    /// Rename a local item.
    async fn change_item_id(&self, old_id: &RecordId, new_id: &RecordId) -> Result<()>;

    /// Every id that exists locally.
    async fn get_all_ids(&self) -> Result<BTreeSet<RecordId>>;

    /// Whether `id` exists locally.
    async fn item_exists(&self, id: &RecordId) -> Result<bool>;
}

/// Local change tracking for one collection.
pub trait Tracker: Send + Sync {
    /// Begin observing local changes.
    fn start(&self);

    /// Stop observing local changes.
    fn stop(&self);

    /// Whether the tracker is observing.
    fn is_tracking(&self) -> bool;

    /// Accumulated score since the scheduler last reset it.
    fn score(&self) -> u32;

    /// Called by the scheduler once it has acted on the score.
    fn reset_score(&self);

    /// Whether change notifications are currently ignored.
    fn ignore_all(&self) -> bool;

    /// Ignore (or stop ignoring) change notifications.
    fn set_ignore_all(&self, ignore: bool);

    /// Whether local state changed since the last successful round.
    fn modified(&self) -> bool;

    /// Forget all pending local changes.
    fn clear_changed_ids(&self);

    /// Counter bumped on every sync-relevant change.
    fn change_epoch(&self) -> u64;

    /// Forget pending changes unless another arrived after `epoch`.
    ///
    /// Returns whether the changes were cleared.
    fn clear_changed_ids_since(&self, epoch: u64) -> bool;
}

/// One collection's sync logic, driven by the scheduler.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine name.
    fn name(&self) -> &str;

    /// Record format version.
    fn version(&self) -> u32;

    /// Lower syncs earlier.
    fn sync_priority(&self) -> u32;

    /// Whether a record that fails to upload may be skipped.
    fn allow_skipped_record(&self) -> bool;

    /// Ids with local changes, with their local modification times.
    async fn get_changed_ids(&self) -> Result<ChangedIds>;

    /// Build the record to upload for `id`.
    async fn create_outgoing(&self, id: &RecordId) -> Result<PrefRecord>;

    /// Decide whether `item` should overwrite local state.
    async fn reconcile(
        &self,
        round: &mut SyncRound,
        item: &IncomingRecord,
        clock: &SyncClock,
    ) -> Result<bool>;

    /// Reconcile `item` and apply it when accepted.
    ///
    /// Returns whether the record was applied.
    async fn apply_incoming(
        &self,
        round: &mut SyncRound,
        item: &IncomingRecord,
        clock: &SyncClock,
    ) -> Result<bool>;

    /// Delete all local data for this collection.
    async fn wipe_client(&self) -> Result<()>;
}

/// Sets a tracker's ignore-all flag for the lifetime of the guard.
pub struct IgnoreAllGuard<'a> {
    tracker: &'a dyn Tracker,
    previous: bool,
}

impl<'a> IgnoreAllGuard<'a> {
    /// Start ignoring `tracker`'s notifications.
    pub fn new(tracker: &'a dyn Tracker) -> Self {
        let previous = tracker.ignore_all();
        tracker.set_ignore_all(true);
        Self { tracker, previous }
    }
}

impl Drop for IgnoreAllGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_ignore_all(self.previous);
    }
}

/// Behaviour shared by all engines.
#[derive(Debug)]
pub struct EngineBase {
    name: String,
    collection: String,
    last_sync: Mutex<f64>,
}

impl EngineBase {
    /// Create the base for engine `name` syncing `collection`.
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            last_sync: Mutex::new(0.0),
        }
    }

    /// Engine name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server time of the last completed round (0 when never synced).
    pub fn last_sync(&self) -> f64 {
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the server time of a completed round.
    pub fn set_last_sync(&self, server_time: f64) {
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = server_time;
    }

    /// Forget sync progress so the next round downloads everything.
    pub fn reset_client(&self) {
        tracing::debug!("{}: resetting client", self.name);
        self.set_last_sync(0.0);
    }

    /// Reset the client and delete local data without tracking the deletes.
    pub async fn default_wipe_client(
        &self,
        store: &dyn Store,
        tracker: &dyn Tracker,
    ) -> Result<()> {
        self.reset_client();
        tracing::debug!("{}: deleting all local data", self.name);
        {
            let _ignore = IgnoreAllGuard::new(tracker);
            store.wipe().await?;
        }
        tracker.clear_changed_ids();
        Ok(())
    }

    /// Standard reconciliation.
    ///
    /// Incoming records win unless the same item also changed locally; then
    /// identical payloads are dropped from the upload set and otherwise the
    /// more recent side wins.
    pub async fn default_reconcile(
        &self,
        store: &dyn Store,
        round: &mut SyncRound,
        item: &IncomingRecord,
        clock: &SyncClock,
    ) -> Result<bool> {
        let id = item.id();
        let exists_locally = store.item_exists(id).await?;
        let local_modified = round.local_modified(id);

        if item.record.deleted && !exists_locally {
            tracing::trace!("{}: ignoring tombstone for unknown item {}", self.name, id);
            return Ok(false);
        }

        let Some(local_modified) = local_modified else {
            return Ok(true);
        };
        if !exists_locally {
            return Ok(true);
        }

        if !item.record.deleted {
            let local = store.create_record(id).await?;
            if local.same_payload(&item.record) {
                tracing::trace!("{}: local and incoming {} are identical", self.name, id);
                round.mark_unchanged(id);
                return Ok(false);
            }
        }

        let remote_age = clock.server_time - item.modified;
        let local_age = clock.now - local_modified;
        let remote_is_newer = remote_age < local_age;
        tracing::debug!(
            "{}: conflict on {} (remote age {:.2}s, local age {:.2}s), {} wins",
            self.name,
            id,
            remote_age,
            local_age,
            if remote_is_newer { "remote" } else { "local" }
        );
        Ok(remote_is_newer)
    }

    /// Standard apply step for an accepted record.
    ///
    /// Tombstones go to [`Store::remove`], unknown items to
    /// [`Store::create`], everything else to [`Store::update`]. Records
    /// routed from another collection are rejected.
    pub async fn default_apply(&self, store: &dyn Store, item: &IncomingRecord) -> Result<()> {
        if item.record.collection != self.collection {
            return Err(PrefsError::InvalidRecord(format!(
                "{} belongs to collection {}, not {}",
                item.id(),
                item.record.collection,
                self.collection
            )));
        }

        let id = item.id();
        if item.record.deleted {
            tracing::trace!("{}: removing {}", self.name, id);
            store.remove(&item.record).await
        } else if !store.item_exists(id).await? {
            tracing::trace!("{}: creating {}", self.name, id);
            store.create(&item.record).await
        } else {
            tracing::trace!("{}: updating {}", self.name, id);
            store.update(&item.record).await
        }
    }
}
