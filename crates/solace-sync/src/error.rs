//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │       Schema            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  SchemaTooNew           │ │
//! │  │  MissingUserId  │  │  Timeout        │  │  (fatal for pulls in    │ │
//! │  │  InvalidUrl     │  │  RemoteApi      │  │   this session)         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │     Local       │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  LocalStore     │  │  NotRunning     │                              │
//! │  │  Serialization  │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine never returns these to the host during background work. Every
//! failure at the push/pull boundary becomes a `SyncStatusInfo` update.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// No user bound to the session.
    #[error("User ID is required to start syncing. Sign in first.")]
    MissingUserId,

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote did not answer in time.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The remote answered with an error status.
    #[error("Remote error {status}: {message}")]
    RemoteApi { status: u16, message: String },

    /// The remote answered with something we could not decode.
    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Schema Errors
    // =========================================================================
    /// The cloud copy was written by a newer app version.
    #[error("Cloud data was saved by a newer version of Solace (schema {remote}, this app understands {local}). Please update the app to keep syncing.")]
    SchemaTooNew { remote: u32, local: u32 },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// The local durable store failed.
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Failed to serialize or deserialize sync data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The engine has no running session.
    #[error("Sync engine is not running")]
    NotRunning,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<solace_db::DbError> for SyncError {
    fn from(err: solace_db::DbError) -> Self {
        SyncError::LocalStore(err.to_string())
    }
}

impl From<solace_core::CoreError> for SyncError {
    fn from(err: solace_core::CoreError) -> Self {
        match err {
            solace_core::CoreError::InvalidSchema(msg) => SyncError::InvalidConfig(msg),
            other => SyncError::SerializationFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::RemoteApi {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation should be retried with backoff.
    ///
    /// Every remote failure is treated as transient. Schema drift and
    /// configuration problems are not: retrying would repeat the same result.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::SchemaTooNew { .. } | SyncError::NotRunning) && !self.is_config_error()
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingUserId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for the schema-too-new condition.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, SyncError::SchemaTooNew { .. })
    }
}
