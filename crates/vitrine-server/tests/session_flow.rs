//! Session actor and archive sync behavior under a simulated clock
//!
//! These tests drive the flush timer deterministically: appends arm the
//! timer, advancing the clock past the deadline fires it, and a stats
//! round trip behind the flush envelope observes the result.

use std::sync::Arc;

use vitrine_core::config::SessionConfig;
use vitrine_core::io::StdRngProvider;
use vitrine_core::{IoContext, PipelineConfig};

use vitrine_server::models::MessageRole;
use vitrine_server::pipeline::AnswerPipeline;
use vitrine_server::session::SessionArena;
use vitrine_server::sim::{SimClock, SimInference, SimKnowledge, SimVectorIndex};
use vitrine_server::storage::{ArchiveStore, HotBuffer, SimArchive, SimCache, SimHotBuffer};
use vitrine_server::tools::ToolRegistry;

struct Harness {
    arena: Arc<SessionArena>,
    clock: SimClock,
    hot: Arc<SimHotBuffer>,
    archive: Arc<SimArchive>,
}

impl Harness {
    fn new() -> Self {
        let clock = SimClock::default();
        let hot = Arc::new(SimHotBuffer::new());
        let archive = Arc::new(SimArchive::new());

        let pipeline = Arc::new(AnswerPipeline::new(
            Arc::new(SimInference::new()),
            Some(Arc::new(SimVectorIndex::new())),
            Some(Arc::new(SimKnowledge::new())),
            Arc::new(SimCache::new()),
            Arc::new(ToolRegistry::new()),
            PipelineConfig::default(),
        ));

        let io = IoContext::new(
            Arc::new(clock.clone()),
            Arc::new(StdRngProvider::with_seed(42)),
        );

        let arena = Arc::new(SessionArena::new(
            hot.clone(),
            archive.clone(),
            pipeline,
            io,
            SessionConfig::default(),
        ));

        Self {
            arena,
            clock,
            hot,
            archive,
        }
    }

    /// Let spawned timer tasks and the actor loop make progress
    async fn settle(&self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(&self, ms: u64) {
        self.settle().await;
        self.clock.advance_ms(ms);
        self.settle().await;
    }
}

#[tokio::test]
async fn test_append_arms_single_flush_timer() {
    let h = Harness::new();

    for i in 0..3 {
        h.arena
            .append("s1", MessageRole::User, format!("msg {i}"), None)
            .await
            .unwrap();
    }

    let stats = h.arena.stats("s1").await.unwrap();
    assert!(stats.flush_timer_armed);
    assert_eq!(stats.unsynced_count, 3);

    // Just before the deadline nothing has been archived
    h.advance(9_999).await;
    assert_eq!(h.archive.upsert_count(), 0);

    // Crossing the deadline flushes exactly once for all three appends
    h.advance(1).await;
    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(h.archive.upsert_count(), 1);
    assert_eq!(stats.unsynced_count, 0);
    assert!(!stats.flush_timer_armed);

    let record = h.archive.load("s1").await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 3);
    assert_eq!(record.started_at_ms, record.messages[0].timestamp_ms);
}

#[tokio::test]
async fn test_flush_trims_hot_buffer_to_window() {
    let h = Harness::new();

    for i in 0..25 {
        h.arena
            .append("s1", MessageRole::User, format!("msg {i:02}"), None)
            .await
            .unwrap();
    }

    h.advance(10_000).await;

    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(stats.message_count, 20);
    assert_eq!(stats.unsynced_count, 0);

    // The archive holds the full transcript, the hot buffer only the window
    let record = h.archive.load("s1").await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 25);

    let messages = h.arena.read("s1").await.unwrap();
    assert_eq!(messages.first().unwrap().content, "msg 05");
    assert_eq!(messages.last().unwrap().content, "msg 24");
}

#[tokio::test]
async fn test_flush_batch_is_capped() {
    let h = Harness::new();

    for i in 0..60 {
        h.arena
            .append("s1", MessageRole::User, format!("msg {i:02}"), None)
            .await
            .unwrap();
    }

    h.advance(10_000).await;

    // 50 oldest marked synced, the archive still gets the whole transcript
    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(stats.message_count, 20);
    assert_eq!(stats.unsynced_count, 10);

    let record = h.archive.load("s1").await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 60);
}

#[tokio::test]
async fn test_failed_flush_retries_without_state_change() {
    let h = Harness::new();
    h.archive.fail_next_upserts(1);

    h.arena
        .append("s1", MessageRole::User, "hello", None)
        .await
        .unwrap();

    h.advance(10_000).await;

    // Failure: nothing synced, nothing archived, retry timer armed
    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(h.archive.upsert_count(), 0);
    assert!(h.archive.load("s1").await.unwrap().is_none());
    assert_eq!(stats.unsynced_count, 1);
    assert_eq!(stats.message_count, 1);
    assert!(stats.flush_timer_armed);

    // Nothing fires before the retry delay elapses
    h.advance(29_999).await;
    assert_eq!(h.archive.upsert_count(), 0);

    // The retry succeeds and drains the batch
    h.advance(1).await;
    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(h.archive.upsert_count(), 1);
    assert_eq!(stats.unsynced_count, 0);
    assert!(!stats.flush_timer_armed);
}

#[tokio::test]
async fn test_archive_upsert_is_idempotent_per_session() {
    let h = Harness::new();

    h.arena
        .append("s1", MessageRole::User, "first", None)
        .await
        .unwrap();
    h.advance(10_000).await;

    h.arena
        .append("s1", MessageRole::User, "second", None)
        .await
        .unwrap();
    h.advance(10_000).await;

    // Two flushes, one row, full transcript
    assert_eq!(h.archive.upsert_count(), 2);
    let record = h.archive.load("s1").await.unwrap().unwrap();
    assert_eq!(record.messages.len(), 2);
    assert_eq!(record.messages[1].content, "second");
    assert!(record.last_write_ms >= record.started_at_ms);
}

#[tokio::test]
async fn test_flush_trims_synced_backlog() {
    let h = Harness::new();

    // Seed the buffer with already-synced history beyond the window
    for i in 0..30 {
        h.hot
            .insert(&vitrine_server::models::Message {
                id: format!("m{i:02}"),
                session_id: "s1".into(),
                role: MessageRole::User,
                content: format!("old {i}"),
                image_base64: None,
                timestamp_ms: 1_000 + i,
                synced: true,
            })
            .await
            .unwrap();
    }

    // An append arms the timer; the flush archives it and trims the backlog
    h.arena
        .append("s1", MessageRole::User, "fresh", None)
        .await
        .unwrap();
    h.advance(10_000).await;

    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(stats.message_count, 20);
    assert_eq!(h.archive.upsert_count(), 1);
}

#[tokio::test]
async fn test_rehydration_from_archive_on_first_use() {
    let h = Harness::new();

    // Archive written by an earlier incarnation; the hot buffer is empty
    let transcript: Vec<_> = (0..30)
        .map(|i| vitrine_server::models::Message {
            id: format!("a{i:02}"),
            session_id: "s1".into(),
            role: if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            },
            content: format!("archived {i}"),
            image_base64: None,
            timestamp_ms: 1_000 + i,
            synced: true,
        })
        .collect();
    h.archive
        .upsert(&vitrine_server::models::ArchiveRecord {
            session_id: "s1".into(),
            customer_id: Some("c9".into()),
            messages: transcript,
            started_at_ms: 1_000,
            last_write_ms: 2_000,
        })
        .await
        .unwrap();

    // First read spawns the actor, which rehydrates the hot window
    h.settle().await;
    let messages = h.arena.read("s1").await.unwrap();
    assert_eq!(messages.len(), 20);
    assert_eq!(messages.first().unwrap().content, "archived 10");
    assert_eq!(messages.last().unwrap().content, "archived 29");

    // Rehydrated history is synced and must not arm a timer
    let stats = h.arena.stats("s1").await.unwrap();
    assert_eq!(stats.unsynced_count, 0);
    assert!(!stats.flush_timer_armed);

    // New appends continue after the archived history
    let appended = h
        .arena
        .append("s1", MessageRole::User, "back again", None)
        .await
        .unwrap();
    assert!(appended.timestamp_ms > 1_029);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_serialize_through_the_mailbox() {
    let h = Harness::new();

    let mut writers = Vec::new();
    for task in 0..4 {
        let arena = h.arena.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..10 {
                arena
                    .append(
                        "s1",
                        MessageRole::User,
                        format!("writer {task} msg {i}"),
                        None,
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let messages = h.arena.read("s1").await.unwrap();
    assert_eq!(messages.len(), 40);

    // Strictly ascending timestamps: no ties, no reordering
    for pair in messages.windows(2) {
        assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
    }

    // Every writer's own sequence survives the interleaving intact
    for task in 0..4 {
        let own: Vec<&str> = messages
            .iter()
            .filter(|m| m.content.starts_with(&format!("writer {task} ")))
            .map(|m| m.content.as_str())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("writer {task} msg {i}")).collect();
        assert_eq!(own, expected);
    }

    // Ids stay unique under contention
    let mut ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 40);
}

#[tokio::test]
async fn test_sessions_flush_independently() {
    let h = Harness::new();

    h.arena
        .append("s1", MessageRole::User, "one", None)
        .await
        .unwrap();
    h.advance(5_000).await;
    h.arena
        .append("s2", MessageRole::User, "two", None)
        .await
        .unwrap();

    // s1 hits its deadline first
    h.advance(5_000).await;
    assert!(h.archive.load("s1").await.unwrap().is_some());
    assert!(h.archive.load("s2").await.unwrap().is_none());

    h.advance(5_000).await;
    assert!(h.archive.load("s2").await.unwrap().is_some());
}
