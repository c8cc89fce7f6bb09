//! # Remote Store
//!
//! The cloud side of sync: one row per user in a `user_data` table.
//!
//! ```text
//!   fetch(user_id)   ──►  SELECT … WHERE user_id = ? LIMIT 1   → 0 or 1 row
//!   upsert(record)   ──►  write unless the stored row is newer    → ok / error
//! ```
//!
//! Implementations:
//! - [`PostgrestRemoteStore`](crate::postgrest::PostgrestRemoteStore) for a
//!   Supabase/PostgREST project
//! - [`MemoryRemoteStore`](crate::memory::MemoryRemoteStore) for tests and
//!   local simulation

use async_trait::async_trait;

use solace_core::CloudRecord;

use crate::error::SyncResult;

/// Access to the per-user cloud record.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the user's record, if one was ever pushed.
    async fn fetch(&self, user_id: &str) -> SyncResult<Option<CloudRecord>>;

    /// Writes the user's record, keyed on `user_id`.
    ///
    /// A stored record with a newer `_localUpdatedAt` is left in place and
    /// the call still succeeds.
    async fn upsert(&self, record: &CloudRecord) -> SyncResult<()>;
}
