//! # Syncable State Extractor
//!
//! Projects the full application state down to the allow-listed fields
//! that may leave the device, and rebuilds a local patch from a pulled blob.
//!
//! ## Projection
//! ```text
//!   full state                       SyncableData
//!   ┌──────────────────┐             ┌──────────────────┐
//!   │ profile      ────┼────────────►│ profile          │
//!   │ goals        ────┼────────────►│ goals            │
//!   │ authToken        │  (dropped)  │ _localUpdatedAt  │
//!   │ deviceId         │  (dropped)  └──────────────────┘
//!   │ ui.modalOpen     │  (dropped)
//!   └──────────────────┘
//! ```
//!
//! Both directions use the same allow-list, so a field outside it never
//! crosses the boundary either way.

use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::types::{StateMap, SyncableData};
use crate::{SCHEMA_VERSION, SYNCABLE_FIELDS};

// =============================================================================
// Sync Schema
// =============================================================================

/// A versioned allow-list of syncable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSchema {
    version: u32,
    fields: BTreeSet<String>,
}

impl SyncSchema {
    /// The schema this build of the app understands.
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            fields: SYNCABLE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Builds a custom schema.
    ///
    /// ## Errors
    /// Returns [`CoreError::InvalidSchema`] for version 0, an empty
    /// allow-list, or an allow-list naming the reserved timestamp key.
    pub fn new<I, S>(version: u32, fields: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if version == 0 {
            return Err(CoreError::InvalidSchema("version must be at least 1".into()));
        }

        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(CoreError::InvalidSchema("allow-list is empty".into()));
        }
        if fields.contains("_localUpdatedAt") {
            return Err(CoreError::InvalidSchema(
                "_localUpdatedAt is reserved and cannot be allow-listed".into(),
            ));
        }

        Ok(Self { version, fields })
    }

    /// Schema version written into every pushed record.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether `field` is on the allow-list.
    pub fn is_syncable(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Whether a record written with `data_version` may be applied locally.
    pub fn accepts(&self, data_version: u32) -> bool {
        data_version <= self.version
    }

    /// The allow-listed field names, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

impl Default for SyncSchema {
    fn default() -> Self {
        Self::current()
    }
}

// =============================================================================
// Projections
// =============================================================================

/// Extracts the syncable subset of `state`, stamped with `now_ms`.
///
/// Allow-listed fields are cloned, so later mutation of `state` is never
/// observed through the returned blob. Missing fields are omitted.
pub fn extract_syncable_state(schema: &SyncSchema, state: &StateMap, now_ms: i64) -> SyncableData {
    let fields = state
        .iter()
        .filter(|(key, _)| schema.is_syncable(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    SyncableData {
        local_updated_at: now_ms,
        fields,
    }
}

/// Rebuilds the partial state patch carried by a pulled blob.
///
/// Only allow-listed keys present in `blob` are returned; anything else a
/// remote writer may have put in the blob is ignored.
pub fn apply_synced_state(schema: &SyncSchema, blob: &SyncableData) -> StateMap {
    blob.fields
        .iter()
        .filter(|(key, _)| schema.is_syncable(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_state() -> StateMap {
        let mut state = StateMap::new();
        state.insert("profile".into(), json!({ "name": "Ada", "age": 36 }));
        state.insert("dailyLogs".into(), json!({ "2024-01-01": { "mood": 4 } }));
        state.insert("streaks".into(), json!({ "current": 5 }));
        state.insert("authToken".into(), json!("secret"));
        state.insert("deviceId".into(), json!("device-a"));
        state.insert("ui".into(), json!({ "modalOpen": true }));
        state
    }

    fn allow_listed(state: &StateMap) -> StateMap {
        let schema = SyncSchema::current();
        state
            .iter()
            .filter(|(k, _)| schema.is_syncable(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_round_trip_equals_allow_listed_subset() {
        let schema = SyncSchema::current();
        let state = full_state();

        let blob = extract_syncable_state(&schema, &state, 1_000);
        let patch = apply_synced_state(&schema, &blob);

        assert_eq!(patch, allow_listed(&state));
        assert_eq!(patch.len(), 3);
        assert!(!patch.contains_key("authToken"));
    }

    #[test]
    fn test_missing_fields_are_omitted() {
        let schema = SyncSchema::current();
        let mut state = StateMap::new();
        state.insert("profile".into(), json!({ "name": "Ada" }));

        let blob = extract_syncable_state(&schema, &state, 5);
        assert_eq!(blob.fields.len(), 1);
        assert!(!blob.fields.contains_key("goals"));
        assert_eq!(blob.local_updated_at, 5);
    }

    #[test]
    fn test_extract_copies_by_value() {
        let schema = SyncSchema::current();
        let mut state = full_state();

        let blob = extract_syncable_state(&schema, &state, 1);
        state.insert("profile".into(), json!({ "name": "Grace" }));

        assert_eq!(blob.fields["profile"]["name"], json!("Ada"));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let schema = SyncSchema::current();
        let state = full_state();
        let a = extract_syncable_state(&schema, &state, 9);
        let b = extract_syncable_state(&schema, &state, 9);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_apply_ignores_foreign_keys_in_blob() {
        let schema = SyncSchema::current();
        let mut fields = StateMap::new();
        fields.insert("goals".into(), json!([]));
        fields.insert("authToken".into(), json!("leaked"));
        let blob = SyncableData {
            local_updated_at: 1,
            fields,
        };

        let patch = apply_synced_state(&schema, &blob);
        assert_eq!(patch.len(), 1);
        assert!(patch.contains_key("goals"));
        // Input untouched
        assert_eq!(blob.fields.len(), 2);
    }

    #[test]
    fn test_schema_validation() {
        assert!(SyncSchema::new(0, ["profile"]).is_err());
        assert!(SyncSchema::new(1, Vec::<String>::new()).is_err());
        assert!(SyncSchema::new(1, ["_localUpdatedAt"]).is_err());

        let schema = SyncSchema::new(3, ["profile", "goals"]).unwrap();
        assert_eq!(schema.version(), 3);
        assert!(schema.accepts(3));
        assert!(schema.accepts(2));
        assert!(!schema.accepts(4));
        assert_eq!(schema.fields().collect::<Vec<_>>(), vec!["goals", "profile"]);
    }
}
