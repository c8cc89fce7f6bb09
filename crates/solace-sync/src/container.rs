//! # Application State Container
//!
//! The engine does not care which reactive store the app uses. Anything that
//! can hand out a snapshot, accept a shallow patch and report changes will do.
//!
//! ```text
//!   app writes ──► StateContainer ──(change listener)──► SyncEngine debounce
//!                        ▲                                      │
//!                        └──────────── merge(patch) ◄───────────┘
//!                                      (pull-apply only)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use solace_core::StateMap;

use crate::listeners::{ListenerId, ListenerSet};

/// Callback invoked after every mutation of the container.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Observable application state.
pub trait StateContainer: Send + Sync {
    /// A copy of the full current state.
    fn snapshot(&self) -> StateMap;

    /// Shallow-merges `patch` into the state: each key replaces the existing
    /// value, keys not in `patch` are left alone.
    fn merge(&self, patch: StateMap);

    /// Registers a change listener.
    fn subscribe(&self, listener: ChangeListener) -> ListenerId;

    /// Removes a change listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);
}

// =============================================================================
// In-Memory Container
// =============================================================================

/// A plain in-memory [`StateContainer`].
///
/// Used by the CLI (backed by a JSON file) and in tests.
#[derive(Default)]
pub struct MemoryStateContainer {
    state: RwLock<StateMap>,
    revision: AtomicU64,
    listeners: ListenerSet<()>,
}

impl MemoryStateContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StateMap) -> Self {
        Self {
            state: RwLock::new(state),
            ..Self::default()
        }
    }

    /// Sets one key and notifies listeners.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut patch = StateMap::new();
        patch.insert(key.into(), value);
        self.merge(patch);
    }

    /// Reads one key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Removes one key and notifies listeners.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.write().remove(key);
        if removed.is_some() {
            self.changed();
        }
        removed
    }

    /// Number of mutations so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn changed(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.listeners.notify(&());
    }

    fn read(&self) -> RwLockReadGuard<'_, StateMap> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateMap> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateContainer for MemoryStateContainer {
    fn snapshot(&self) -> StateMap {
        self.read().clone()
    }

    fn merge(&self, patch: StateMap) {
        {
            let mut state = self.write();
            for (key, value) in patch {
                state.insert(key, value);
            }
        }
        self.changed();
    }

    fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.subscribe(Arc::new(move |_: &()| listener()))
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_merge_is_shallow() {
        let container = MemoryStateContainer::new();
        container.set("profile", json!({ "name": "Ada", "age": 36 }));
        container.set("authToken", json!("secret"));

        let mut patch = StateMap::new();
        patch.insert("profile".into(), json!({ "name": "Grace" }));
        container.merge(patch);

        assert_eq!(container.get("profile"), Some(json!({ "name": "Grace" })));
        assert_eq!(container.get("authToken"), Some(json!("secret")));
        assert_eq!(container.revision(), 3);
    }

    #[test]
    fn test_listeners_fire_until_unsubscribed() {
        let container = MemoryStateContainer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let id = container.subscribe(Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        container.set("goals", json!([]));
        container.unsubscribe(id);
        container.set("goals", json!([1]));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(container.listener_count(), 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let container = MemoryStateContainer::new();
        container.set("streaks", json!({ "current": 1 }));

        let snapshot = container.snapshot();
        container.set("streaks", json!({ "current": 2 }));

        assert_eq!(snapshot["streaks"], json!({ "current": 1 }));
    }
}
