//! # Local Key-Value Repository
//!
//! Durable string values keyed by name, stored in `local_kv`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for the `local_kv` table.
#[derive(Debug, Clone)]
pub struct LocalKvRepository {
    pool: SqlitePool,
}

impl LocalKvRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LocalKvRepository { pool }
    }

    /// Reads a value. `None` if the key was never written or was removed.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM local_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Writes a value, replacing any previous one.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, "Writing local value");

        sqlx::query(
            r#"
            INSERT INTO local_kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a value. Returns true if a row was deleted.
    pub async fn remove(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM local_kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
