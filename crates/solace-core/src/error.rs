//! # Error Types
//!
//! Domain-specific error types for solace-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  solace-core errors (this file)                                        │
//! │  └── CoreError        - Schema definition / serialization failures     │
//! │                                                                         │
//! │  solace-db errors (separate crate)                                     │
//! │  └── DbError          - Local database failures                        │
//! │                                                                         │
//! │  solace-sync errors (separate crate)                                   │
//! │  └── SyncError        - What the engine turns into status updates      │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → SyncStatusInfo.error → UI               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core sync model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sync schema definition is unusable.
    ///
    /// ## When This Occurs
    /// - Version 0
    /// - Empty allow-list
    /// - Allow-list contains the reserved `_localUpdatedAt` key
    #[error("Invalid sync schema: {0}")]
    InvalidSchema(String),

    /// Syncable state could not be serialized.
    #[error("Failed to serialize syncable state: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidSchema("allow-list is empty".into());
        assert_eq!(err.to_string(), "Invalid sync schema: allow-list is empty");
    }
}
