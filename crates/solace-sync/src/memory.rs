//! # In-Memory Remote Store
//!
//! A [`RemoteStore`] that keeps records in process memory. Several engines
//! can share one instance to simulate a user's devices talking to the same
//! cloud row.
//!
//! Upserts are conditional: a write whose `_localUpdatedAt` is older than the
//! stored record's is accepted but ignored, so the newest device write wins
//! no matter which request lands last.
//!
//! ## Fault Injection
//! - [`fail_next_upserts`](MemoryRemoteStore::fail_next_upserts) /
//!   [`fail_next_fetches`](MemoryRemoteStore::fail_next_fetches)
//! - [`set_latency`](MemoryRemoteStore::set_latency) delays every call
//!   (tokio time, so paused-clock tests control it)

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use solace_core::CloudRecord;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, CloudRecord>,
    failing_upserts: u32,
    failing_fetches: u32,
    latency: Duration,
    upsert_attempts: Vec<Instant>,
    fetch_attempts: Vec<Instant>,
}

/// Shared, in-process cloud table.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` upserts fail with a connection error.
    pub fn fail_next_upserts(&self, count: u32) {
        self.lock().failing_upserts = count;
    }

    /// The next `count` fetches fail with a connection error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.lock().failing_fetches = count;
    }

    /// Delay applied to every call before it takes effect.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Stores `record` as-is, bypassing the newer-wins check.
    pub fn put_record(&self, record: CloudRecord) {
        self.lock().records.insert(record.user_id.clone(), record);
    }

    /// The stored record for `user_id`.
    pub fn record(&self, user_id: &str) -> Option<CloudRecord> {
        self.lock().records.get(user_id).cloned()
    }

    /// Number of upsert calls received, failed ones included.
    pub fn upsert_count(&self) -> usize {
        self.lock().upsert_attempts.len()
    }

    /// Number of fetch calls received, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_attempts.len()
    }

    /// When each upsert call arrived (tokio clock).
    pub fn upsert_attempts(&self) -> Vec<Instant> {
        self.lock().upsert_attempts.clone()
    }

    /// When each fetch call arrived (tokio clock).
    pub fn fetch_attempts(&self) -> Vec<Instant> {
        self.lock().fetch_attempts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, user_id: &str) -> SyncResult<Option<CloudRecord>> {
        let latency = {
            let mut state = self.lock();
            state.fetch_attempts.push(Instant::now());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(SyncError::ConnectionFailed("simulated fetch failure".into()));
        }

        Ok(state.records.get(user_id).cloned())
    }

    async fn upsert(&self, record: &CloudRecord) -> SyncResult<()> {
        let latency = {
            let mut state = self.lock();
            state.upsert_attempts.push(Instant::now());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(SyncError::ConnectionFailed("simulated upsert failure".into()));
        }

        if let Some(existing) = state.records.get(&record.user_id) {
            if existing.data.local_updated_at > record.data.local_updated_at {
                debug!(
                    user_id = %record.user_id,
                    stored = existing.data.local_updated_at,
                    incoming = record.data.local_updated_at,
                    "Ignoring older write"
                );
                return Ok(());
            }
        }

        let mut stored = record.clone();
        stored.updated_at = Some(Utc::now());
        state.records.insert(record.user_id.clone(), stored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use solace_core::{StateMap, SyncableData};

    fn record(at: i64, goal: &str) -> CloudRecord {
        let mut fields = StateMap::new();
        fields.insert("goals".into(), json!([goal]));
        CloudRecord::new("user-1", SyncableData { local_updated_at: at, fields }, 1)
    }

    #[tokio::test]
    async fn test_upsert_then_fetch() {
        let store = MemoryRemoteStore::new();
        assert!(store.fetch("user-1").await.unwrap().is_none());

        store.upsert(&record(10, "walk")).await.unwrap();
        let fetched = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(fetched.data.local_updated_at, 10);
        assert!(fetched.updated_at.is_some());
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_older_write_landing_last_is_ignored() {
        let store = MemoryRemoteStore::new();
        store.upsert(&record(20, "newer")).await.unwrap();
        store.upsert(&record(10, "older")).await.unwrap();

        let stored = store.record("user-1").unwrap();
        assert_eq!(stored.data.local_updated_at, 20);
        assert_eq!(stored.data.fields["goals"], json!(["newer"]));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryRemoteStore::new();
        store.fail_next_upserts(1);
        store.fail_next_fetches(1);

        assert!(store.upsert(&record(1, "a")).await.is_err());
        assert!(store.upsert(&record(1, "a")).await.is_ok());
        assert!(store.fetch("user-1").await.is_err());
        assert!(store.fetch("user-1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_effect() {
        let store = std::sync::Arc::new(MemoryRemoteStore::new());
        store.set_latency(Duration::from_secs(5));

        let s = std::sync::Arc::clone(&store);
        let call = tokio::spawn(async move { s.upsert(&record(1, "a")).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.upsert_count(), 1);
        assert!(store.record("user-1").is_none());

        call.await.unwrap().unwrap();
        assert!(store.record("user-1").is_some());
    }
}
