//! Storage trait seams
//!
//! TigerStyle: Traits at the seams so production SQLite and simulated
//! in-memory backends are interchangeable.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ArchiveRecord, Message};

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("write rejected: {reason}")]
    WriteRejected { reason: String },
}

impl StorageError {
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    pub fn write_rejected(reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            reason: reason.into(),
        }
    }
}

/// Storage result type
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Fast local message buffer, one logical queue per session
///
/// The buffer is the source of truth between flushes. Messages enter with
/// `synced = false` and become eligible for trimming once marked synced.
#[async_trait]
pub trait HotBuffer: Send + Sync {
    /// Insert one message; the caller has already assigned id and timestamp
    async fn insert(&self, message: &Message) -> StorageResult<()>;

    /// All messages for a session ordered by timestamp ascending
    async fn messages(&self, session_id: &str) -> StorageResult<Vec<Message>>;

    /// Up to `limit` unsynced messages for a session, oldest first
    async fn unsynced(&self, session_id: &str, limit: usize) -> StorageResult<Vec<Message>>;

    /// Mark the given message IDs as synced
    async fn mark_synced(&self, session_id: &str, ids: &[String]) -> StorageResult<()>;

    /// Drop everything but the `keep` most recent messages of a session
    async fn trim_to_recent(&self, session_id: &str, keep: usize) -> StorageResult<()>;

    /// Count of messages currently buffered for a session
    async fn count(&self, session_id: &str) -> StorageResult<usize>;

    /// Count of unsynced messages for a session
    async fn unsynced_count(&self, session_id: &str) -> StorageResult<usize>;
}

/// Durable session archive, one row per session
///
/// Upserts are idempotent: replaying a flush replaces the row with the same
/// transcript rather than duplicating anything.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Insert or fully replace the archive row for a session
    async fn upsert(&self, record: &ArchiveRecord) -> StorageResult<()>;

    /// Load the archive row for a session, if any
    async fn load(&self, session_id: &str) -> StorageResult<Option<ArchiveRecord>>;
}

/// Exact-match answer cache for text-only queries
///
/// Shared across sessions; last write wins.
#[async_trait]
pub trait AnswerCache: Send + Sync {
    /// Look up a cached answer by the exact query text
    async fn get(&self, query: &str) -> StorageResult<Option<String>>;

    /// Insert or replace the cached answer for a query
    async fn put(&self, query: &str, answer: &str) -> StorageResult<()>;
}
