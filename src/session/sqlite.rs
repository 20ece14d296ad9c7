//! SQLite 会话存储
//!
//! 每个会话一行，内容以 JSON 文本保存，支持跨重启恢复

#![cfg(feature = "async-sqlite")]

use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;

use super::session::Session;
use super::storage::SessionStorage;
use crate::error::StorageError;

pub struct SqliteSessionStorage {
    pool: sqlx::sqlite::SqlitePool,
}

impl SqliteSessionStorage {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let storage = Self { pool };
        storage.init_tables().await?;
        Ok(storage)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS dialog_sessions (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for SqliteSessionStorage {
    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query("SELECT data FROM dialog_sessions WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, session: &Session) -> Result<(), StorageError> {
        let data = serde_json::to_string(session)?;
        sqlx::query(
            "INSERT INTO dialog_sessions (key, data, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(data)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM dialog_sessions WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
