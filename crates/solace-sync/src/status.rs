//! # Status Broadcaster
//!
//! Publishes [`SyncStatusInfo`] transitions to any number of subscribers.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Status Delivery                                   │
//! │                                                                         │
//! │   SessionWorker ──► StatusBroadcaster ──┬──► callback listeners         │
//! │    (transitions)     (dedupes repeats)  │    (called immediately on     │
//! │                                         │     subscribe, then on every  │
//! │                                         │     change)                   │
//! │                                         │                               │
//! │                                         └──► watch::Receiver            │
//! │                                              (async consumers)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use solace_core::{SyncStatus, SyncStatusInfo};

use crate::listeners::{ListenerId, ListenerSet};

struct Inner {
    tx: watch::Sender<SyncStatusInfo>,
    listeners: ListenerSet<SyncStatusInfo>,
    /// Held while publishing and while a new subscriber catches up, so no
    /// transition falls between its first callback and its registration.
    publish: Mutex<()>,
}

impl Inner {
    fn publishing(&self) -> MutexGuard<'_, ()> {
        self.publish.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out of status transitions. Cheap to clone.
#[derive(Clone)]
pub struct StatusBroadcaster {
    inner: Arc<Inner>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatusInfo::idle());
        Self {
            inner: Arc::new(Inner {
                tx,
                listeners: ListenerSet::new(),
                publish: Mutex::new(()),
            }),
        }
    }

    /// Current status.
    pub fn current(&self) -> SyncStatusInfo {
        self.inner.tx.borrow().clone()
    }

    /// Registers `listener`. It is called right away with the current status,
    /// then on every transition until [`StatusSubscription::unsubscribe`] is
    /// called.
    ///
    /// Listeners run while a transition is being published and must not
    /// subscribe to the same broadcaster from inside the callback.
    pub fn subscribe<F>(&self, listener: F) -> StatusSubscription
    where
        F: Fn(&SyncStatusInfo) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let id = {
            let _publishing = self.inner.publishing();
            listener(&self.current());
            self.inner.listeners.subscribe(listener)
        };

        StatusSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Async view of the status for consumers that prefer awaiting changes.
    pub fn watch(&self) -> watch::Receiver<SyncStatusInfo> {
        self.inner.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // =========================================================================
    // Transitions (engine only)
    // =========================================================================

    pub(crate) fn syncing(&self) {
        self.update(|info| {
            info.status = SyncStatus::Syncing;
            info.error = None;
        });
    }

    pub(crate) fn idle(&self, synced_at: Option<i64>) {
        self.update(|info| {
            info.status = SyncStatus::Idle;
            info.error = None;
            if synced_at.is_some() {
                info.last_synced_at = synced_at;
            }
        });
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|info| {
            info.status = SyncStatus::Error;
            info.error = Some(message);
        });
    }

    pub(crate) fn offline(&self) {
        self.update(|info| {
            info.status = SyncStatus::Offline;
            info.error = None;
        });
    }

    /// Fresh `idle` with no sync history, for a stopped or new session.
    pub(crate) fn reset(&self) {
        self.update(|info| *info = SyncStatusInfo::idle());
    }

    fn update(&self, apply: impl FnOnce(&mut SyncStatusInfo)) {
        let _publishing = self.inner.publishing();
        let mut next = self.current();
        apply(&mut next);

        let changed = self.inner.tx.send_if_modified(|info| {
            if *info == next {
                false
            } else {
                *info = next.clone();
                true
            }
        });

        if changed {
            debug!(status = %next.status, error = ?next.error, "Sync status changed");
            self.inner.listeners.notify(&next);
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Live status subscription. Dropping it keeps the listener registered;
/// call [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct StatusSubscription {
    id: ListenerId,
    inner: std::sync::Weak<Inner>,
}

impl StatusSubscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.unsubscribe(self.id);
        }
    }
}
