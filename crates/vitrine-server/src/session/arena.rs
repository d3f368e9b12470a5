//! Session arena
//!
//! Maps session keys to running actors. Each actor owns a bounded mailbox
//! processed by one task, which is what serializes all operations for a
//! session; the arena itself only routes envelopes. A full mailbox is an
//! explicit error, never a silent drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use vitrine_core::config::SessionConfig;
use vitrine_core::constants::SESSIONS_ACTIVE_COUNT_MAX;
use vitrine_core::{Error, IoContext, Result};

use super::actor::{SessionActor, SessionOp, SessionStats, TurnOutcome};
use crate::models::{validate_session_id, Message, MessageRole};
use crate::pipeline::AnswerPipeline;
use crate::storage::{ArchiveStore, HotBuffer};

/// Arena of session actors
///
/// Sessions are created implicitly on first use and stay resident; the
/// storage layer is shared, the actors are not.
pub struct SessionArena {
    sessions: Mutex<HashMap<String, mpsc::Sender<SessionOp>>>,
    hot: Arc<dyn HotBuffer>,
    archive: Arc<dyn ArchiveStore>,
    pipeline: Arc<AnswerPipeline>,
    io: IoContext,
    config: SessionConfig,
}

impl SessionArena {
    pub fn new(
        hot: Arc<dyn HotBuffer>,
        archive: Arc<dyn ArchiveStore>,
        pipeline: Arc<AnswerPipeline>,
        io: IoContext,
        config: SessionConfig,
    ) -> Self {
        assert!(config.mailbox_depth_max > 0, "mailbox depth must be positive");

        Self {
            sessions: Mutex::new(HashMap::new()),
            hot,
            archive,
            pipeline,
            io,
            config,
        }
    }

    /// Append a message to a session without answering it
    pub async fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: impl Into<String>,
        image_base64: Option<String>,
    ) -> Result<Message> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(
            session_id,
            SessionOp::Append {
                role,
                content: content.into(),
                image_base64,
                reply,
            },
        )?;
        self.await_reply(session_id, "append", rx).await
    }

    /// Read a session's transcript ordered by timestamp
    pub async fn read(&self, session_id: &str) -> Result<Vec<Message>> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(session_id, SessionOp::Read { reply })?;
        self.await_reply(session_id, "read", rx).await
    }

    /// Handle one turn; user turns run the answer pipeline
    pub async fn handle_turn(
        &self,
        session_id: &str,
        role: MessageRole,
        content: impl Into<String>,
        image_base64: Option<String>,
    ) -> Result<TurnOutcome> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(
            session_id,
            SessionOp::HandleTurn {
                role,
                content: content.into(),
                image_base64,
                reply,
            },
        )?;
        self.await_reply(session_id, "handle_turn", rx).await
    }

    /// Observability snapshot for a session
    pub async fn stats(&self, session_id: &str) -> Result<SessionStats> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(session_id, SessionOp::Stats { reply })?;
        self.await_reply(session_id, "stats", rx).await
    }

    /// Number of resident session actors
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Route an envelope, spawning the actor on first use
    fn dispatch(&self, session_id: &str, op: SessionOp) -> Result<()> {
        validate_session_id(session_id)?;

        let tx = {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get(session_id) {
                Some(tx) if !tx.is_closed() => tx.clone(),
                _ => {
                    if sessions.len() >= SESSIONS_ACTIVE_COUNT_MAX {
                        return Err(Error::internal(format!(
                            "session limit reached: {}",
                            SESSIONS_ACTIVE_COUNT_MAX
                        )));
                    }

                    let (tx, rx) = mpsc::channel(self.config.mailbox_depth_max);
                    let actor = SessionActor::new(
                        session_id.to_string(),
                        self.hot.clone(),
                        self.archive.clone(),
                        self.pipeline.clone(),
                        self.io.clone(),
                        self.config.clone(),
                        tx.clone(),
                    );
                    tokio::spawn(actor.run(rx));
                    sessions.insert(session_id.to_string(), tx.clone());
                    tracing::debug!(session_id = %session_id, "session actor spawned");
                    tx
                }
            }
        };

        tx.try_send(op).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::SessionMailboxFull {
                session_id: session_id.to_string(),
                depth: self.config.mailbox_depth_max,
                max: self.config.mailbox_depth_max,
            },
            mpsc::error::TrySendError::Closed(_) => Error::SessionClosed {
                session_id: session_id.to_string(),
            },
        })
    }

    async fn await_reply<T>(
        &self,
        session_id: &str,
        operation: &str,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        rx.await.map_err(|_| {
            Error::session_operation_failed(session_id, operation, "actor dropped reply")
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::AnswerPipeline;
    use crate::sim::{SimClock, SimInference, SimKnowledge, SimVectorIndex};
    use crate::storage::{SimArchive, SimCache, SimHotBuffer};
    use crate::tools::ToolRegistry;
    use vitrine_core::io::StdRngProvider;
    use vitrine_core::PipelineConfig;

    fn arena() -> (SessionArena, Arc<SimInference>) {
        let inference = Arc::new(SimInference::new());
        let pipeline = Arc::new(AnswerPipeline::new(
            inference.clone(),
            Some(Arc::new(SimVectorIndex::new())),
            Some(Arc::new(SimKnowledge::new())),
            Arc::new(SimCache::new()),
            Arc::new(ToolRegistry::new()),
            PipelineConfig::default(),
        ));
        let io = IoContext::new(
            Arc::new(SimClock::default()),
            Arc::new(StdRngProvider::with_seed(7)),
        );
        let arena = SessionArena::new(
            Arc::new(SimHotBuffer::new()),
            Arc::new(SimArchive::new()),
            pipeline,
            io,
            SessionConfig::default(),
        );
        (arena, inference)
    }

    #[tokio::test]
    async fn test_invalid_session_id_rejected() {
        let (arena, _) = arena();
        let err = arena.read("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidSessionId { .. }));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let (arena, _) = arena();

        arena
            .append("s1", MessageRole::User, "hello from one", None)
            .await
            .unwrap();
        arena
            .append("s2", MessageRole::User, "hello from two", None)
            .await
            .unwrap();

        assert_eq!(arena.session_count(), 2);
        assert_eq!(arena.read("s1").await.unwrap().len(), 1);
        assert_eq!(arena.read("s2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_then_read_in_order() {
        let (arena, _) = arena();

        for i in 0..5 {
            arena
                .append("s1", MessageRole::User, format!("msg {i}"), None)
                .await
                .unwrap();
        }

        let messages = arena.read("s1").await.unwrap();
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.content, format!("msg {i}"));
        }
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
        }
    }

    #[tokio::test]
    async fn test_handle_turn_appends_user_and_assistant() {
        let (arena, inference) = arena();
        inference.push_completion("three bracelets in stock");

        let outcome = arena
            .handle_turn("s1", MessageRole::User, "bracelets?", None)
            .await
            .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].role, MessageRole::User);
        assert_eq!(outcome.messages[1].role, MessageRole::Assistant);
        assert_eq!(outcome.messages[1].content, "three bracelets in stock");
    }

    #[tokio::test]
    async fn test_non_user_turn_skips_pipeline() {
        let (arena, inference) = arena();

        let outcome = arena
            .handle_turn("s1", MessageRole::System, "greeting configured", None)
            .await
            .unwrap();

        assert!(outcome.answer.is_none());
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(inference.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_failure_yields_fallback_reply() {
        let (arena, inference) = arena();
        inference.fail_next_embed(1);

        let outcome = arena
            .handle_turn("s1", MessageRole::User, "bracelets?", None)
            .await
            .unwrap();

        assert!(outcome.answer.is_none());
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(
            outcome.messages[1].content,
            crate::pipeline::ANSWER_FALLBACK
        );
    }

    #[tokio::test]
    async fn test_stats_reports_unsynced_and_timer() {
        let (arena, _) = arena();

        arena
            .append("s1", MessageRole::User, "hello", None)
            .await
            .unwrap();

        let stats = arena.stats("s1").await.unwrap();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.unsynced_count, 1);
        assert!(stats.flush_timer_armed);
    }
}
