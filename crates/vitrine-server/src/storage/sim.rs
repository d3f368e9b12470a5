//! In-memory simulation backends with fault injection
//!
//! Behavioral twins of the SQLite store for deterministic tests. The archive
//! counts writes and can be told to reject the next N upserts, which is how
//! the flush-retry path is exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{AnswerCache, ArchiveStore, HotBuffer, StorageError, StorageResult};
use crate::models::{ArchiveRecord, Message};

/// In-memory hot buffer
#[derive(Debug, Default)]
pub struct SimHotBuffer {
    messages: Mutex<Vec<Message>>,
}

impl SimHotBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HotBuffer for SimHotBuffer {
    async fn insert(&self, message: &Message) -> StorageResult<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> StorageResult<Vec<Message>> {
        let mut msgs: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        msgs.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(msgs)
    }

    async fn unsynced(&self, session_id: &str, limit: usize) -> StorageResult<Vec<Message>> {
        let mut msgs = self.messages(session_id).await?;
        msgs.retain(|m| !m.synced);
        msgs.truncate(limit);
        Ok(msgs)
    }

    async fn mark_synced(&self, session_id: &str, ids: &[String]) -> StorageResult<()> {
        let mut messages = self.messages.lock().unwrap();
        for m in messages.iter_mut() {
            if m.session_id == session_id && ids.contains(&m.id) {
                m.synced = true;
            }
        }
        Ok(())
    }

    async fn trim_to_recent(&self, session_id: &str, keep: usize) -> StorageResult<()> {
        let kept: Vec<String> = {
            let mut msgs = self.messages(session_id).await?;
            msgs.sort_by(|a, b| {
                b.timestamp_ms
                    .cmp(&a.timestamp_ms)
                    .then_with(|| b.id.cmp(&a.id))
            });
            msgs.into_iter().take(keep).map(|m| m.id).collect()
        };

        self.messages
            .lock()
            .unwrap()
            .retain(|m| m.session_id != session_id || kept.contains(&m.id));
        Ok(())
    }

    async fn count(&self, session_id: &str) -> StorageResult<usize> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .count())
    }

    async fn unsynced_count(&self, session_id: &str) -> StorageResult<usize> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id && !m.synced)
            .count())
    }
}

/// In-memory archive with write-failure injection
#[derive(Debug, Default)]
pub struct SimArchive {
    rows: Mutex<HashMap<String, ArchiveRecord>>,
    fail_remaining: AtomicU64,
    upsert_count: AtomicU64,
}

impl SimArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` upserts with a write error
    pub fn fail_next_upserts(&self, n: u64) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of successful upserts so far
    pub fn upsert_count(&self) -> u64 {
        self.upsert_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for SimArchive {
    async fn upsert(&self, record: &ArchiveRecord) -> StorageResult<()> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::write_rejected("injected archive fault"));
        }

        self.rows
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record.clone());
        self.upsert_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StorageResult<Option<ArchiveRecord>> {
        Ok(self.rows.lock().unwrap().get(session_id).cloned())
    }
}

/// In-memory answer cache
#[derive(Debug, Default)]
pub struct SimCache {
    entries: Mutex<HashMap<String, String>>,
}

impl SimCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnswerCache for SimCache {
    async fn get(&self, query: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(query).cloned())
    }

    async fn put(&self, query: &str, answer: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(query.to_string(), answer.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn message(id: &str, ts: u64, synced: bool) -> Message {
        Message {
            id: id.to_string(),
            session_id: "s1".into(),
            role: MessageRole::User,
            content: "hi".into(),
            image_base64: None,
            timestamp_ms: ts,
            synced,
        }
    }

    #[tokio::test]
    async fn test_sim_hot_buffer_matches_sql_semantics() {
        let buf = SimHotBuffer::new();
        buf.insert(&message("b", 200, false)).await.unwrap();
        buf.insert(&message("a", 100, false)).await.unwrap();
        buf.insert(&message("c", 300, true)).await.unwrap();

        let msgs = buf.messages("s1").await.unwrap();
        assert_eq!(
            msgs.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );

        assert_eq!(buf.unsynced("s1", 1).await.unwrap()[0].id, "a");

        buf.mark_synced("s1", &["a".into(), "b".into()]).await.unwrap();
        assert_eq!(buf.unsynced_count("s1").await.unwrap(), 0);

        buf.trim_to_recent("s1", 1).await.unwrap();
        let msgs = buf.messages("s1").await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "c");
    }

    #[tokio::test]
    async fn test_sim_archive_fault_injection() {
        let archive = SimArchive::new();
        let record = ArchiveRecord {
            session_id: "s1".into(),
            customer_id: None,
            messages: vec![message("a", 100, true)],
            started_at_ms: 100,
            last_write_ms: 200,
        };

        archive.fail_next_upserts(1);
        assert!(archive.upsert(&record).await.is_err());
        assert_eq!(archive.upsert_count(), 0);
        assert!(archive.load("s1").await.unwrap().is_none());

        archive.upsert(&record).await.unwrap();
        assert_eq!(archive.upsert_count(), 1);
        assert!(archive.load("s1").await.unwrap().is_some());
    }
}
