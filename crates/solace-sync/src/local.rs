//! # Local Durable Store
//!
//! String key-value storage that survives restarts. The engine keeps one
//! value in it: the `_localUpdatedAt` of the last blob this device confirmed
//! (pushed successfully or applied from a pull).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use solace_db::Database;

use crate::error::{SyncError, SyncResult};

/// Key of the last confirmed sync timestamp.
pub const LAST_CONFIRMED_KEY: &str = "solace.sync.lastConfirmedAt";

/// Durable string storage.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()>;
}

#[async_trait]
impl LocalStore for Database {
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.kv().get(key).await?)
    }

    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        Ok(self.kv().set(key, value).await?)
    }
}

/// Reads the last confirmed timestamp. A malformed value counts as absent.
pub async fn read_confirmation(store: &dyn LocalStore) -> SyncResult<Option<i64>> {
    let Some(raw) = store.get_item(LAST_CONFIRMED_KEY).await? else {
        return Ok(None);
    };

    match raw.trim().parse::<i64>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            warn!(value = %raw, "Ignoring malformed sync confirmation");
            Ok(None)
        }
    }
}

/// Persists the last confirmed timestamp.
pub async fn write_confirmation(store: &dyn LocalStore, confirmed_at: i64) -> SyncResult<()> {
    store.set_item(LAST_CONFIRMED_KEY, &confirmed_at.to_string()).await
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Non-durable [`LocalStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    items: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.items.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        if *self.fail_writes.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(SyncError::LocalStore("write rejected".into()));
        }
        self.items
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solace_db::DbConfig;

    #[tokio::test]
    async fn test_confirmation_round_trip_in_memory() {
        let store = MemoryLocalStore::new();
        assert_eq!(read_confirmation(&store).await.unwrap(), None);

        write_confirmation(&store, 1_700_000_000_000).await.unwrap();
        assert_eq!(read_confirmation(&store).await.unwrap(), Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_malformed_confirmation_is_absent() {
        let store = MemoryLocalStore::new();
        store.set_item(LAST_CONFIRMED_KEY, "not-a-number").await.unwrap();
        assert_eq!(read_confirmation(&store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_database_is_a_local_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        write_confirmation(&db, 42).await.unwrap();
        assert_eq!(read_confirmation(&db).await.unwrap(), Some(42));
        assert_eq!(db.kv().get(LAST_CONFIRMED_KEY).await.unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let store = MemoryLocalStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            write_confirmation(&store, 1).await,
            Err(SyncError::LocalStore(_))
        ));
    }
}
