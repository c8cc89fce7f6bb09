//! Observer registry shared by the status broadcaster and the in-memory
//! state container.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A boxed listener taking `&T`.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered set of listeners.
///
/// Listeners are invoked outside the internal lock, so a listener may
/// subscribe or unsubscribe (itself or others) while being notified.
pub struct ListenerSet<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns false if `id` was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A listener that panicked must not take the whole set down with it.
    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_and_unsubscribe() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&total);
        let first = set.subscribe(Arc::new(move |v: &u32| {
            t.fetch_add(*v as usize, Ordering::SeqCst);
        }));
        let t = Arc::clone(&total);
        set.subscribe(Arc::new(move |v: &u32| {
            t.fetch_add(*v as usize * 10, Ordering::SeqCst);
        }));

        set.notify(&1);
        assert_eq!(total.load(Ordering::SeqCst), 11);

        assert!(set.unsubscribe(first));
        assert!(!set.unsubscribe(first));
        set.notify(&1);
        assert_eq!(total.load(Ordering::SeqCst), 21);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let set: Arc<ListenerSet<()>> = Arc::new(ListenerSet::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let s = Arc::clone(&set);
        let sl = Arc::clone(&slot);
        let id = set.subscribe(Arc::new(move |_: &()| {
            if let Some(id) = *sl.lock().unwrap() {
                s.unsubscribe(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        set.notify(&());
        assert!(set.is_empty());
    }
}
