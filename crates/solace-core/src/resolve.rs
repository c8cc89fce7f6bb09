//! Last-write-wins decision for pulled records.
//!
//! The winner is picked by the originating device's wall clock
//! (`_localUpdatedAt`), not by arrival order at the server.

use crate::types::SyncableData;

/// What to do with a pulled blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Remote is newer than anything this device confirmed; merge it in.
    ApplyRemote,
    /// Remote is same-or-older; the next push carries local state forward.
    KeepLocal,
}

/// Compares a remote blob with the last locally confirmed sync time.
///
/// With no confirmation on record the remote wins, which is what a fresh
/// install signing into an existing account expects.
pub fn resolve(remote: &SyncableData, last_confirmed_at: Option<i64>) -> Resolution {
    match last_confirmed_at {
        Some(confirmed) if remote.local_updated_at <= confirmed => Resolution::KeepLocal,
        _ => Resolution::ApplyRemote,
    }
}
