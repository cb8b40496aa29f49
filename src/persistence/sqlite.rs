//! SQLite-based checkpoint store

use crate::persistence::CheckpointStore;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;

/// SQLite checkpoint store
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) a checkpoint database
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .context("Failed to connect to checkpoint database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's data directory
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        let db_dir = data_dir.join("pipeline-controller");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        Ok(db_dir.join("checkpoints.db"))
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                subscriber TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, subscriber: &str) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT version FROM checkpoints WHERE subscriber = ?1")
            .bind(subscriber)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load checkpoint")?;

        Ok(row.map(|row| row.get::<i64, _>("version") as u64))
    }

    async fn save(&self, subscriber: &str, version: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (subscriber, version, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(subscriber) DO UPDATE SET
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(subscriber)
        .bind(version as i64)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .context("Failed to save checkpoint")?;

        Ok(())
    }
}
