//! # solace-sync: Cloud Sync Engine for Solace
//!
//! Best-effort background sync of the user's wellness data between the
//! device and a single cloud row per user.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Data Flow                                  │
//! │                                                                         │
//! │  app mutation ──► StateContainer ──► debounce (2s) ──► extract          │
//! │                                                         │               │
//! │                               changed since last push? ─┤               │
//! │                                                         ▼               │
//! │                                                RemoteStore::upsert      │
//! │                                                         │               │
//! │                                        confirmation ◄───┘               │
//! │                                        (LocalStore)                     │
//! │                                                                         │
//! │  start / online / foreground ──► RemoteStore::fetch                     │
//! │        remote newer than confirmation? ──► apply patch ──► container    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - `SyncEngine` lifecycle and the session task
//! - [`status`] - Status broadcaster for the UI
//! - [`container`] - Observable app state seam
//! - [`remote`], [`postgrest`], [`memory`] - Cloud record access
//! - [`local`] - Durable confirmation timestamp
//! - [`environment`] - Connectivity and foreground signals
//! - [`clock`] - Wall-clock source
//! - [`config`] - TOML/env configuration
//! - [`error`] - Error types

pub mod clock;
pub mod config;
pub mod container;
pub mod engine;
pub mod environment;
pub mod error;
pub mod listeners;
pub mod local;
pub mod memory;
pub mod postgrest;
pub mod remote;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use container::{ChangeListener, MemoryStateContainer, StateContainer};
pub use engine::{PullOutcome, PushOutcome, SyncEngine, SyncEngineBuilder};
pub use environment::{EnvironmentSignals, HostEnvironment};
pub use error::{SyncError, SyncResult};
pub use listeners::ListenerId;
pub use local::{LocalStore, MemoryLocalStore, LAST_CONFIRMED_KEY};
pub use memory::MemoryRemoteStore;
pub use postgrest::PostgrestRemoteStore;
pub use remote::RemoteStore;
pub use status::{StatusBroadcaster, StatusSubscription};

pub use solace_core::{SyncStatus, SyncStatusInfo};
