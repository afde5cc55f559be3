//! Preference storage seam.
//!
//! The engine never owns preference storage. It reads and writes single
//! named preferences through [`PrefService`] and learns about local edits
//! through a [`Subscription`] that dispatches [`PrefChange`] messages.
//!
//! [`MemoryPrefs`] is an in-memory implementation with default values,
//! per-type enforcement and change notification, suitable for tests and
//! for hosts that keep preferences in their own structures.

use prefs_types::{PrefType, PrefValue, PrefsError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A local preference changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefChange {
    /// Full name of the preference that changed.
    pub name: String,
}

impl PrefChange {
    /// Create a change message for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Receives preference change messages.
pub trait PrefObserver: Send + Sync {
    /// Called after a preference value changed.
    fn observe(&self, change: &PrefChange);
}

/// Registration handle returned by [`PrefService::subscribe`].
///
/// Dropping the handle deregisters the observer.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Create a handle that runs `cancel` when dropped.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Deregister now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Access to the host's preference storage.
pub trait PrefService: Send + Sync {
    /// Effective value: the user value if set, otherwise the default.
    fn get(&self, name: &str) -> Option<PrefValue>;

    /// Type of the preference, if it exists at all.
    fn pref_type(&self, name: &str) -> Option<PrefType>;

    /// Whether a user value overrides the default.
    fn is_set(&self, name: &str) -> bool;

    /// Set a user value.
    ///
    /// Fails with [`PrefsError::TypeMismatch`] when the preference already
    /// exists with a different type.
    fn set(&self, name: &str, value: PrefValue) -> Result<()>;

    /// Drop the user value, falling back to the default.
    fn reset(&self, name: &str);

    /// Names under `branch`, relative to it.
    fn child_list(&self, branch: &str) -> Vec<String>;

    /// Register for change notifications on every preference.
    fn subscribe(&self, observer: Arc<dyn PrefObserver>) -> Subscription;

    /// Boolean value of `name`, or `default` when absent or not a boolean.
    fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

/// In-memory preference service.
///
/// Cloning shares the underlying storage.
#[derive(Clone, Default)]
pub struct MemoryPrefs {
    inner: Arc<Mutex<MemoryPrefsInner>>,
}

#[derive(Default)]
struct MemoryPrefsInner {
    defaults: BTreeMap<String, PrefValue>,
    user: BTreeMap<String, PrefValue>,
    observers: BTreeMap<u64, Arc<dyn PrefObserver>>,
    next_observer: u64,
}

impl MemoryPrefsInner {
    fn existing_type(&self, name: &str) -> Option<PrefType> {
        self.user
            .get(name)
            .or_else(|| self.defaults.get(name))
            .map(PrefValue::pref_type)
    }

    fn observers(&self) -> Vec<Arc<dyn PrefObserver>> {
        self.observers.values().cloned().collect()
    }
}

fn lock_inner(inner: &Mutex<MemoryPrefsInner>) -> MutexGuard<'_, MemoryPrefsInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryPrefs {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryPrefsInner> {
        lock_inner(&self.inner)
    }

    /// Register a default value. Does not notify observers.
    pub fn set_default(&self, name: &str, value: impl Into<PrefValue>) {
        self.lock().defaults.insert(name.to_string(), value.into());
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    // Observers run without the lock held so they can read preferences.
    fn notify(observers: Vec<Arc<dyn PrefObserver>>, name: &str) {
        let change = PrefChange::new(name);
        for observer in observers {
            observer.observe(&change);
        }
    }
}

impl fmt::Debug for MemoryPrefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryPrefs")
            .field("defaults", &inner.defaults)
            .field("user", &inner.user)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl PrefService for MemoryPrefs {
    fn get(&self, name: &str) -> Option<PrefValue> {
        let inner = self.lock();
        inner
            .user
            .get(name)
            .or_else(|| inner.defaults.get(name))
            .cloned()
    }

    fn pref_type(&self, name: &str) -> Option<PrefType> {
        self.lock().existing_type(name)
    }

    fn is_set(&self, name: &str) -> bool {
        self.lock().user.contains_key(name)
    }

    fn set(&self, name: &str, value: PrefValue) -> Result<()> {
        let observers = {
            let mut inner = self.lock();
            if let Some(expected) = inner.existing_type(name) {
                if expected != value.pref_type() {
                    return Err(PrefsError::TypeMismatch {
                        name: name.to_string(),
                        expected,
                        actual: value.pref_type(),
                    });
                }
            }
            let previous = inner.user.get(name).or_else(|| inner.defaults.get(name));
            let changed = previous != Some(&value);
            // Setting the default value clears the user value.
            if inner.defaults.get(name) == Some(&value) {
                inner.user.remove(name);
            } else {
                inner.user.insert(name.to_string(), value);
            }
            if !changed {
                return Ok(());
            }
            inner.observers()
        };
        Self::notify(observers, name);
        Ok(())
    }

    fn reset(&self, name: &str) {
        let observers = {
            let mut inner = self.lock();
            let Some(previous) = inner.user.remove(name) else {
                return;
            };
            if inner.defaults.get(name) == Some(&previous) {
                return;
            }
            inner.observers()
        };
        Self::notify(observers, name);
    }

    fn child_list(&self, branch: &str) -> Vec<String> {
        let inner = self.lock();
        let names: BTreeSet<&String> = inner.defaults.keys().chain(inner.user.keys()).collect();
        names
            .into_iter()
            .filter_map(|name| name.strip_prefix(branch))
            .map(str::to_string)
            .collect()
    }

    fn subscribe(&self, observer: Arc<dyn PrefObserver>) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_observer;
            inner.next_observer += 1;
            inner.observers.insert(id, observer);
            id
        };

        let weak: Weak<Mutex<MemoryPrefsInner>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock_inner(&inner).observers.remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl PrefObserver for Recorder {
        fn observe(&self, change: &PrefChange) {
            self.seen.lock().unwrap().push(change.name.clone());
        }
    }

    // ===========================================
    // Value storage
    // ===========================================

    #[test]
    fn default_then_user_value() {
        let prefs = MemoryPrefs::new();
        prefs.set_default("foo", 1);
        assert_eq!(prefs.get("foo"), Some(PrefValue::Int(1)));
        assert!(!prefs.is_set("foo"));

        prefs.set("foo", 2.into()).unwrap();
        assert_eq!(prefs.get("foo"), Some(PrefValue::Int(2)));
        assert!(prefs.is_set("foo"));

        prefs.reset("foo");
        assert_eq!(prefs.get("foo"), Some(PrefValue::Int(1)));
        assert!(!prefs.is_set("foo"));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let prefs = MemoryPrefs::new();
        prefs.set_default("foo", 1);

        let err = prefs.set("foo", "text".into()).unwrap_err();
        assert!(matches!(
            err,
            PrefsError::TypeMismatch {
                expected: PrefType::Int,
                actual: PrefType::String,
                ..
            }
        ));
        assert_eq!(prefs.get("foo"), Some(PrefValue::Int(1)));
    }

    #[test]
    fn new_pref_takes_any_type() {
        let prefs = MemoryPrefs::new();
        prefs.set("fresh", "x".into()).unwrap();
        assert_eq!(prefs.pref_type("fresh"), Some(PrefType::String));
        assert_eq!(prefs.pref_type("missing"), None);
    }

    #[test]
    fn child_list_is_relative_and_deduplicated() {
        let prefs = MemoryPrefs::new();
        prefs.set_default("a.b.one", true);
        prefs.set("a.b.one", false.into()).unwrap();
        prefs.set("a.b.two", true.into()).unwrap();
        prefs.set("a.c", true.into()).unwrap();

        assert_eq!(prefs.child_list("a.b."), vec!["one", "two"]);
    }

    #[test]
    fn get_bool_falls_back_on_wrong_type() {
        let prefs = MemoryPrefs::new();
        prefs.set("flag", "yes".into()).unwrap();
        assert!(prefs.get_bool("flag", true));
        assert!(!prefs.get_bool("absent", false));
    }

    // ===========================================
    // Notifications
    // ===========================================

    #[test]
    fn observers_see_changes_only() {
        let prefs = MemoryPrefs::new();
        let recorder = Arc::new(Recorder::default());
        let _sub = prefs.subscribe(recorder.clone());

        prefs.set("foo", 1.into()).unwrap();
        prefs.set("foo", 1.into()).unwrap();
        prefs.reset("foo");
        prefs.reset("foo");

        assert_eq!(recorder.seen(), vec!["foo", "foo"]);
    }

    #[test]
    fn setting_the_default_clears_user_value() {
        let prefs = MemoryPrefs::new();
        prefs.set_default("foo", 1);
        let recorder = Arc::new(Recorder::default());
        let _sub = prefs.subscribe(recorder.clone());

        prefs.set("foo", 1.into()).unwrap();
        assert!(!prefs.is_set("foo"));
        assert!(recorder.seen().is_empty());

        prefs.set("foo", 2.into()).unwrap();
        prefs.set("foo", 1.into()).unwrap();
        assert!(!prefs.is_set("foo"));
        assert_eq!(prefs.get("foo"), Some(PrefValue::Int(1)));
        assert_eq!(recorder.seen(), vec!["foo", "foo"]);
    }

    #[test]
    fn dropping_subscription_deregisters() {
        let prefs = MemoryPrefs::new();
        let recorder = Arc::new(Recorder::default());
        let sub = prefs.subscribe(recorder.clone());
        assert_eq!(prefs.observer_count(), 1);

        drop(sub);
        assert_eq!(prefs.observer_count(), 0);

        prefs.set("foo", 1.into()).unwrap();
        assert!(recorder.seen().is_empty());
    }

    #[test]
    fn observer_may_read_prefs() {
        struct Reader {
            prefs: MemoryPrefs,
            read: Mutex<Option<PrefValue>>,
        }
        impl PrefObserver for Reader {
            fn observe(&self, change: &PrefChange) {
                *self.read.lock().unwrap() = self.prefs.get(&change.name);
            }
        }

        let prefs = MemoryPrefs::new();
        let reader = Arc::new(Reader {
            prefs: prefs.clone(),
            read: Mutex::new(None),
        });
        let _sub = prefs.subscribe(reader.clone());

        prefs.set("foo", "bar".into()).unwrap();
        assert_eq!(*reader.read.lock().unwrap(), Some(PrefValue::from("bar")));
    }
}
