//! SQLite storage backend
//!
//! One pool serves all three stores: hot buffer, archive and answer cache.
//! WAL journal with a single connection keeps writers serialized the same
//! way the session mailbox serializes operations.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};

use super::traits::{AnswerCache, ArchiveStore, HotBuffer, StorageError, StorageResult};
use crate::models::{ArchiveRecord, Message, MessageRole};

/// SQLite-backed store for the hot buffer, archive and cache
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a database at the given path
    pub async fn open(path: &str) -> StorageResult<Self> {
        assert!(!path.is_empty(), "database path must not be empty");

        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an ephemeral in-memory database (tests, local runs)
    pub async fn memory() -> StorageResult<Self> {
        Self::open(":memory:").await
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                id           TEXT PRIMARY KEY,
                session_id   TEXT NOT NULL,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                image_base64 TEXT,
                timestamp_ms INTEGER NOT NULL,
                synced       INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_messages_session
             ON local_messages(session_id, timestamp_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions_archive (
                session_id    TEXT PRIMARY KEY,
                customer_id   TEXT,
                messages      TEXT NOT NULL,
                started_at_ms INTEGER NOT NULL,
                last_write_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rag_cache (
                query    TEXT PRIMARY KEY,
                response TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> StorageResult<Message> {
        let role: String = row.get("role");
        let role = MessageRole::from_str(&role)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        Ok(Message {
            id: row.get("id"),
            session_id: row.get("session_id"),
            role,
            content: row.get("content"),
            image_base64: row.get("image_base64"),
            timestamp_ms: row.get::<i64, _>("timestamp_ms") as u64,
            synced: row.get::<i64, _>("synced") != 0,
        })
    }
}

#[async_trait]
impl HotBuffer for SqliteStore {
    async fn insert(&self, message: &Message) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO local_messages (id, session_id, role, content, image_base64, timestamp_ms, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.image_base64)
        .bind(message.timestamp_ms as i64)
        .bind(message.synced as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> StorageResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM local_messages WHERE session_id = ?
             ORDER BY timestamp_ms ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn unsynced(&self, session_id: &str, limit: usize) -> StorageResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM local_messages WHERE session_id = ? AND synced = 0
             ORDER BY timestamp_ms ASC, id ASC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn mark_synced(&self, session_id: &str, ids: &[String]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE local_messages SET synced = 1 WHERE session_id = ? AND id = ?")
                .bind(session_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn trim_to_recent(&self, session_id: &str, keep: usize) -> StorageResult<()> {
        sqlx::query(
            r#"
            DELETE FROM local_messages
            WHERE session_id = ?
              AND id NOT IN (
                  SELECT id FROM local_messages
                  WHERE session_id = ?
                  ORDER BY timestamp_ms DESC, id DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(session_id)
        .bind(session_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self, session_id: &str) -> StorageResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM local_messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn unsynced_count(&self, session_id: &str) -> StorageResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM local_messages WHERE session_id = ? AND synced = 0",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ArchiveStore for SqliteStore {
    async fn upsert(&self, record: &ArchiveRecord) -> StorageResult<()> {
        let messages = serde_json::to_string(&record.messages)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sessions_archive (session_id, customer_id, messages, started_at_ms, last_write_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                customer_id = excluded.customer_id,
                messages = excluded.messages,
                started_at_ms = excluded.started_at_ms,
                last_write_ms = excluded.last_write_ms
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.customer_id)
        .bind(messages)
        .bind(record.started_at_ms as i64)
        .bind(record.last_write_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StorageResult<Option<ArchiveRecord>> {
        let row = sqlx::query("SELECT * FROM sessions_archive WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages: Vec<Message> =
            serde_json::from_str(row.get::<String, _>("messages").as_str())
                .map_err(|e| StorageError::serialization(e.to_string()))?;

        Ok(Some(ArchiveRecord {
            session_id: row.get("session_id"),
            customer_id: row.get("customer_id"),
            messages,
            started_at_ms: row.get::<i64, _>("started_at_ms") as u64,
            last_write_ms: row.get::<i64, _>("last_write_ms") as u64,
        }))
    }
}

#[async_trait]
impl AnswerCache for SqliteStore {
    async fn get(&self, query: &str) -> StorageResult<Option<String>> {
        let response: Option<String> =
            sqlx::query_scalar("SELECT response FROM rag_cache WHERE query = ?")
                .bind(query)
                .fetch_optional(&self.pool)
                .await?;
        Ok(response)
    }

    async fn put(&self, query: &str, answer: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO rag_cache (query, response) VALUES (?, ?)
             ON CONFLICT(query) DO UPDATE SET response = excluded.response",
        )
        .bind(query)
        .bind(answer)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
