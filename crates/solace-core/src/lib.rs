//! # solace-core: Pure Sync Model for Solace
//!
//! This crate holds everything about cloud sync that can be expressed
//! without I/O: what gets synced, how timing behaves, and who wins a
//! conflict.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Solace Sync Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 solace-sync (SyncEngine)                        │   │
//! │  │    timers, network calls, status broadcasting                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ solace-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  extract  │  │ schedule  │  │  resolve  │  │   │
//! │  │   │ Syncable  │  │ allow-list│  │ debounce  │  │   LWW by  │  │   │
//! │  │   │ CloudRec  │  │ projection│  │  backoff  │  │ timestamp │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Wire types (`SyncableData`, `CloudRecord`, `SyncStatusInfo`)
//! - [`extract`] - Allow-list projection in both directions
//! - [`schedule`] - Debounce/flush intervals and retry backoff
//! - [`resolve`] - Last-write-wins decision for pulled blobs
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use solace_core::{apply_synced_state, extract_syncable_state, StateMap, SyncSchema};
//!
//! let schema = SyncSchema::current();
//! let mut state = StateMap::new();
//! state.insert("profile".into(), json!({ "name": "Ada" }));
//! state.insert("authToken".into(), json!("secret"));
//!
//! let blob = extract_syncable_state(&schema, &state, 1_700_000_000_000);
//! assert_eq!(blob.local_updated_at, 1_700_000_000_000);
//! assert!(blob.fields.contains_key("profile"));
//! assert!(!blob.fields.contains_key("authToken"));
//!
//! let patch = apply_synced_state(&schema, &blob);
//! assert_eq!(patch.len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod extract;
pub mod resolve;
pub mod schedule;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use extract::{apply_synced_state, extract_syncable_state, SyncSchema};
pub use resolve::{resolve, Resolution};
pub use schedule::{RetryBackoff, SyncSchedule};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Schema version of the built-in allow-list.
///
/// Bump whenever the shape of an allow-listed field changes incompatibly.
/// Clients refuse to apply blobs written with a larger version.
pub const SCHEMA_VERSION: u32 = 1;

/// Fields of the application state that are synced to the cloud.
///
/// Anything else in the state container (auth tokens, device identifiers,
/// transient UI state) never leaves the device.
pub const SYNCABLE_FIELDS: &[&str] = &[
    "profile",
    "preferences",
    "goals",
    "progress",
    "streaks",
    "dailyLogs",
    "checkIns",
    "patterns",
];
