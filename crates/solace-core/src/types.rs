//! # Sync Types
//!
//! Types exchanged between the engine, the cloud record and the UI.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Sync Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐      ┌──────────────────┐                        │
//! │  │  SyncableData    │      │   CloudRecord    │                        │
//! │  │                  │ ───► │                  │                        │
//! │  │ _localUpdatedAt  │      │ user_id (unique) │                        │
//! │  │ profile, goals…  │      │ data             │                        │
//! │  └──────────────────┘      │ data_version     │                        │
//! │                            │ updated_at       │                        │
//! │                            └──────────────────┘                        │
//! │                                                                         │
//! │  ┌──────────────────┐                                                  │
//! │  │  SyncStatusInfo  │  idle | syncing | error | offline                │
//! │  │  (UI-facing)     │  + lastSyncedAt + error message                  │
//! │  └──────────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::CoreResult;

/// Keyed application state, as held by the state container.
///
/// Keys are kept in sorted order, so serializing the same state twice
/// always yields the same bytes.
pub type StateMap = serde_json::Map<String, Value>;

// =============================================================================
// Syncable Data
// =============================================================================

/// The syncable subset of application state plus the local modification
/// timestamp. This is the blob stored in the cloud record's `data` column.
///
/// ## Wire Shape
/// ```json
/// { "_localUpdatedAt": 1700000000000, "profile": { ... }, "goals": [ ... ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableData {
    /// Wall-clock milliseconds when this snapshot was extracted.
    #[serde(rename = "_localUpdatedAt", default)]
    pub local_updated_at: i64,

    /// Allow-listed fields, deep-copied out of the state.
    #[serde(flatten)]
    pub fields: StateMap,
}

impl SyncableData {
    /// Change-detection fingerprint of the synced fields.
    ///
    /// `_localUpdatedAt` is not part of the fingerprint: two snapshots of
    /// unchanged state taken at different times must compare equal.
    pub fn fingerprint(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// Returns true if no allow-listed field was present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Cloud Record
// =============================================================================

/// One row of the remote `user_data` table. Unique per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudRecord {
    /// Owner of the record.
    pub user_id: String,

    /// Latest pushed syncable blob.
    pub data: SyncableData,

    /// Schema version the writer used.
    pub data_version: u32,

    /// Server-maintained modification time. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CloudRecord {
    /// Builds the record a client pushes. `updated_at` is left to the server.
    pub fn new(user_id: impl Into<String>, data: SyncableData, data_version: u32) -> Self {
        Self {
            user_id: user_id.into(),
            data,
            data_version,
            updated_at: None,
        }
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Coarse sync state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing in flight; last operation succeeded (or none ran yet).
    #[default]
    Idle,
    /// A push or pull is in flight.
    Syncing,
    /// The last operation failed.
    Error,
    /// The host reports no connectivity.
    Offline,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
            SyncStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Status record published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusInfo {
    pub status: SyncStatus,

    /// Milliseconds of the last successful push or pull.
    pub last_synced_at: Option<i64>,

    /// Human-readable message of the last failure.
    pub error: Option<String>,
}

impl SyncStatusInfo {
    /// The initial, never-synced status.
    pub fn idle() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blob(at: i64) -> SyncableData {
        let mut fields = StateMap::new();
        fields.insert("goals".into(), json!([{ "id": 1, "title": "Walk" }]));
        fields.insert("profile".into(), json!({ "name": "Ada" }));
        SyncableData {
            local_updated_at: at,
            fields,
        }
    }

    #[test]
    fn test_syncable_data_wire_shape() {
        let value = serde_json::to_value(blob(42)).unwrap();
        assert_eq!(value["_localUpdatedAt"], json!(42));
        assert_eq!(value["profile"]["name"], json!("Ada"));

        let back: SyncableData = serde_json::from_value(value).unwrap();
        assert_eq!(back, blob(42));
    }

    #[test]
    fn test_fingerprint_ignores_timestamp() {
        assert_eq!(blob(1).fingerprint().unwrap(), blob(2).fingerprint().unwrap());

        let mut changed = blob(1);
        changed.fields.insert("streaks".into(), json!({ "current": 3 }));
        assert_ne!(blob(1).fingerprint().unwrap(), changed.fingerprint().unwrap());
    }

    #[test]
    fn test_cloud_record_omits_missing_updated_at() {
        let record = CloudRecord::new("user-1", blob(7), 1);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("updated_at").is_none());
        assert_eq!(value["data_version"], json!(1));
    }

    #[test]
    fn test_status_serialization() {
        let info = SyncStatusInfo {
            status: SyncStatus::Error,
            last_synced_at: Some(10),
            error: Some("boom".into()),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["lastSyncedAt"], json!(10));
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
        assert_eq!(SyncStatusInfo::idle().status, SyncStatus::Idle);
    }
}
