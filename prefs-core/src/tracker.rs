//! Change tracker for synced preferences.
//!
//! While observing, every notification for a control flag or an opted-in
//! preference raises the score and sets the persisted "modified" flag. The
//! scheduler polls both; the engine reports the prefs record as changed
//! until the flag is cleared after a successful round.
//!
//! Notifications are dropped while `ignore_all` is set, which the engine
//! does around its own bulk writes.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::filter::PrefFilter;
use crate::flag::PersistedFlag;
use crate::framework::Tracker;
use crate::prefs::{PrefChange, PrefObserver, PrefService, Subscription};

/// Observation state of the tracker.
#[derive(Debug, Default)]
pub enum TrackerState {
    /// Not registered for notifications.
    #[default]
    Stopped,
    /// Registered; dropping the subscription deregisters.
    Observing {
        /// Registration with the preference service.
        subscription: Subscription,
    },
}

impl TrackerState {
    /// Whether notifications are being received.
    pub fn is_observing(&self) -> bool {
        matches!(self, Self::Observing { .. })
    }
}

/// Counters shared with the preference service's observer list.
struct TrackerShared {
    filter: PrefFilter,
    modified: Arc<dyn PersistedFlag>,
    score_increment: u32,
    score: AtomicU32,
    ignore_all: AtomicBool,
    epoch: AtomicU64,
}

impl TrackerShared {
    fn on_pref_changed(&self, name: &str) {
        if self.ignore_all.load(Ordering::SeqCst) {
            return;
        }
        // A flag change alters what gets synced; a governed pref change
        // alters a synced value. Both need a round.
        if !self.filter.is_eligible(name) {
            return;
        }

        let increment = self.score_increment;
        let _ = self
            .score
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |score| {
                Some(score.saturating_add(increment))
            });
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.modified.set(true);
        tracing::trace!("Preference {} changed", name);
    }
}

impl PrefObserver for TrackerShared {
    fn observe(&self, change: &PrefChange) {
        self.on_pref_changed(&change.name);
    }
}

/// Tracks local edits to synced preferences.
pub struct PrefTracker {
    prefs: Arc<dyn PrefService>,
    shared: Arc<TrackerShared>,
    state: Mutex<TrackerState>,
}

impl PrefTracker {
    /// Create a stopped tracker.
    ///
    /// `modified` persists the dirty bit; `score_increment` is added per
    /// relevant change.
    pub fn new(
        prefs: Arc<dyn PrefService>,
        filter: PrefFilter,
        modified: Arc<dyn PersistedFlag>,
        score_increment: u32,
    ) -> Self {
        Self {
            prefs,
            shared: Arc::new(TrackerShared {
                filter,
                modified,
                score_increment,
                score: AtomicU32::new(0),
                ignore_all: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
            state: Mutex::new(TrackerState::Stopped),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a change notification directly.
    ///
    /// Hosts that deliver notifications themselves instead of through
    /// [`PrefService::subscribe`] call this.
    pub fn observe(&self, change: &PrefChange) {
        self.shared.on_pref_changed(&change.name);
    }
}

impl Tracker for PrefTracker {
    fn start(&self) {
        let mut state = self.state();
        if state.is_observing() {
            return;
        }
        let subscription = self.prefs.subscribe(self.shared.clone());
        *state = TrackerState::Observing { subscription };
        tracing::info!("Prefs tracker started");
    }

    fn stop(&self) {
        let previous = std::mem::take(&mut *self.state());
        if let TrackerState::Observing { subscription } = previous {
            subscription.cancel();
            tracing::info!("Prefs tracker stopped");
        }
    }

    fn is_tracking(&self) -> bool {
        self.state().is_observing()
    }

    fn score(&self) -> u32 {
        self.shared.score.load(Ordering::SeqCst)
    }

    fn reset_score(&self) {
        self.shared.score.store(0, Ordering::SeqCst);
    }

    fn ignore_all(&self) -> bool {
        self.shared.ignore_all.load(Ordering::SeqCst)
    }

    fn set_ignore_all(&self, ignore: bool) {
        self.shared.ignore_all.store(ignore, Ordering::SeqCst);
    }

    fn modified(&self) -> bool {
        self.shared.modified.get()
    }

    fn clear_changed_ids(&self) {
        self.shared.modified.set(false);
    }

    fn change_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    fn clear_changed_ids_since(&self, epoch: u64) -> bool {
        if self.change_epoch() != epoch {
            return false;
        }
        self.shared.modified.set(false);
        // A change that raced the clear must stay visible to the next round.
        if self.change_epoch() != epoch {
            self.shared.modified.set(true);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flag::{MemoryFlag, PrefFlag};
    use crate::framework::SCORE_INCREMENT_XLARGE;
    use crate::prefs::MemoryPrefs;

    const PREFIX: &str = "services.sync.prefs.sync.";

    fn tracker_with(prefs: &MemoryPrefs, modified: Arc<dyn PersistedFlag>) -> PrefTracker {
        let service: Arc<dyn PrefService> = Arc::new(prefs.clone());
        let filter = PrefFilter::new(service.clone(), &EngineConfig::default()).unwrap();
        PrefTracker::new(service, filter, modified, SCORE_INCREMENT_XLARGE)
    }

    fn tracker(prefs: &MemoryPrefs) -> PrefTracker {
        tracker_with(prefs, Arc::new(MemoryFlag::default()))
    }

    // ===========================================
    // Lifecycle
    // ===========================================

    #[test]
    fn starts_stopped() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        assert!(!tracker.is_tracking());
        assert_eq!(prefs.observer_count(), 0);
    }

    #[test]
    fn start_registers_once() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();
        tracker.start();
        assert!(tracker.is_tracking());
        assert_eq!(prefs.observer_count(), 1);
    }

    #[test]
    fn stop_deregisters() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();
        tracker.stop();
        assert!(!tracker.is_tracking());
        assert_eq!(prefs.observer_count(), 0);

        prefs.set(&format!("{PREFIX}foo"), true.into()).unwrap();
        assert!(!tracker.modified());
        assert_eq!(tracker.score(), 0);
    }

    #[test]
    fn dropping_tracker_deregisters() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();
        drop(tracker);
        assert_eq!(prefs.observer_count(), 0);
    }

    // ===========================================
    // Change handling
    // ===========================================

    #[test]
    fn flag_change_marks_modified() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();

        prefs.set(&format!("{PREFIX}foo"), true.into()).unwrap();

        assert!(tracker.modified());
        assert_eq!(tracker.score(), SCORE_INCREMENT_XLARGE);
    }

    #[test]
    fn opted_in_pref_change_marks_modified() {
        let prefs = MemoryPrefs::new();
        prefs.set(&format!("{PREFIX}foo"), true.into()).unwrap();
        let tracker = tracker(&prefs);
        tracker.start();

        prefs.set("foo", 1.into()).unwrap();
        prefs.set("foo", 2.into()).unwrap();

        assert!(tracker.modified());
        assert_eq!(tracker.score(), 2 * SCORE_INCREMENT_XLARGE);
        assert_eq!(tracker.change_epoch(), 2);
    }

    #[test]
    fn unsynced_pref_change_is_ignored() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();

        prefs.set("foo", 1.into()).unwrap();

        assert!(!tracker.modified());
        assert_eq!(tracker.score(), 0);
    }

    #[test]
    fn ignore_all_suppresses_changes() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.start();
        tracker.set_ignore_all(true);

        prefs.set(&format!("{PREFIX}foo"), true.into()).unwrap();
        assert!(!tracker.modified());

        tracker.set_ignore_all(false);
        prefs.set(&format!("{PREFIX}foo"), false.into()).unwrap();
        assert!(tracker.modified());
    }

    #[test]
    fn direct_observe_without_subscription() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);

        tracker.observe(&PrefChange::new(format!("{PREFIX}foo")));
        assert!(tracker.modified());
    }

    #[test]
    fn score_saturates() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.shared.score.store(u32::MAX - 1, Ordering::SeqCst);

        tracker.observe(&PrefChange::new(format!("{PREFIX}foo")));
        assert_eq!(tracker.score(), u32::MAX);

        tracker.reset_score();
        assert_eq!(tracker.score(), 0);
    }

    // ===========================================
    // Clearing
    // ===========================================

    #[test]
    fn clear_changed_ids_resets_modified() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.observe(&PrefChange::new(format!("{PREFIX}foo")));

        tracker.clear_changed_ids();
        assert!(!tracker.modified());
    }

    #[test]
    fn clear_since_keeps_later_changes() {
        let prefs = MemoryPrefs::new();
        let tracker = tracker(&prefs);
        tracker.observe(&PrefChange::new(format!("{PREFIX}foo")));
        let epoch = tracker.change_epoch();

        tracker.observe(&PrefChange::new(format!("{PREFIX}bar")));
        assert!(!tracker.clear_changed_ids_since(epoch));
        assert!(tracker.modified());

        let epoch = tracker.change_epoch();
        assert!(tracker.clear_changed_ids_since(epoch));
        assert!(!tracker.modified());
    }

    #[test]
    fn modified_persists_through_prefs() {
        let prefs = MemoryPrefs::new();
        let service: Arc<dyn PrefService> = Arc::new(prefs.clone());
        let flag = Arc::new(PrefFlag::new(service, "services.sync.engine.prefs.modified"));
        let tracker = tracker_with(&prefs, flag);
        tracker.start();

        prefs.set(&format!("{PREFIX}foo"), true.into()).unwrap();
        drop(tracker);

        // A tracker built after a restart sees the persisted state.
        let service: Arc<dyn PrefService> = Arc::new(prefs.clone());
        let flag = Arc::new(PrefFlag::new(service, "services.sync.engine.prefs.modified"));
        let restarted = tracker_with(&prefs, flag);
        assert!(restarted.modified());
    }
}
