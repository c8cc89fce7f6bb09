//! # Host Environment Signals
//!
//! Connectivity and foreground state reported by the host app.
//!
//! ## Reactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Environment → Engine                                │
//! │                                                                         │
//! │  online  false → true     pull, then push                              │
//! │  online  true  → false    status = offline (no backoff, no calls)      │
//! │  foreground false → true  pull                                          │
//! │  about to terminate       SyncEngine::flush_before_exit (host calls)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Writer side, owned by the host. Cheap to clone.
#[derive(Clone)]
pub struct HostEnvironment {
    online: Arc<watch::Sender<bool>>,
    foreground: Arc<watch::Sender<bool>>,
}

impl HostEnvironment {
    /// Starts in the foreground with the given connectivity.
    pub fn new(online: bool) -> Self {
        let (online, _) = watch::channel(online);
        let (foreground, _) = watch::channel(true);
        Self {
            online: Arc::new(online),
            foreground: Arc::new(foreground),
        }
    }

    /// Reports connectivity. Repeated values are not re-announced.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            debug!(online, "Connectivity changed");
        }
    }

    /// Reports whether the app is visible to the user.
    pub fn set_foreground(&self, foreground: bool) {
        let changed = self.foreground.send_if_modified(|current| {
            let changed = *current != foreground;
            *current = foreground;
            changed
        });
        if changed {
            debug!(foreground, "Visibility changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn is_foreground(&self) -> bool {
        *self.foreground.borrow()
    }

    /// Fresh receivers for one engine session.
    pub fn signals(&self) -> EnvironmentSignals {
        EnvironmentSignals {
            online: self.online.subscribe(),
            foreground: self.foreground.subscribe(),
        }
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Reader side, held by a running session.
pub struct EnvironmentSignals {
    pub online: watch::Receiver<bool>,
    pub foreground: watch::Receiver<bool>,
}

impl EnvironmentSignals {
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }
}
