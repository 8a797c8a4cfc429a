//! Persistence module
//!
//! Key/value persistence boundary for durable player data. The services
//! only see `get`/`set` over JSON blobs; the backing store is either
//! PostgreSQL or an in-memory map (tests, headless runs without a
//! database).

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::debug;

use crate::error::PersistenceError;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, PersistenceError>;

/// Key/value persistence collaborator
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Fetch a record by key; `Ok(None)` means the key has never been
    /// written, which is distinct from a backend failure
    async fn get(&self, key: &str) -> BackendResult<Option<serde_json::Value>>;

    /// Write a record, replacing any previous value for the key
    async fn set(&self, key: &str, value: serde_json::Value) -> BackendResult<()>;
}

/// PostgreSQL-backed persistence
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist
    pub async fn ensure_schema(&self) -> BackendResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS player_saves (
                save_key TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        debug!("Ensured player_saves schema");
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for PostgresStore {
    async fn get(&self, key: &str) -> BackendResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT data FROM player_saves WHERE save_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row
                    .try_get("data")
                    .map_err(|e| PersistenceError::CorruptRecord {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> BackendResult<()> {
        sqlx::query(
            "INSERT INTO player_saves (save_key, data, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (save_key)
             DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        Ok(())
    }
}

/// In-memory persistence used for tests and database-less runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, serde_json::Value>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryStore {
    async fn get(&self, key: &str) -> BackendResult<Option<serde_json::Value>> {
        Ok(self.records.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> BackendResult<()> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }
}
