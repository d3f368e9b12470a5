//! Session actor
//!
//! Owns one visitor conversation: appends to the hot buffer, answers user
//! turns through the pipeline, and flushes the transcript to the archive on
//! a timer. The actor processes its mailbox strictly in order, so no two
//! operations for one session ever interleave.
//!
//! Archive sync contract:
//! - an append arms the flush timer if none is pending
//! - a flush archives the full transcript, marks the selected batch synced
//!   and trims the hot buffer to the context window
//! - a failed flush leaves the buffer untouched and re-arms the timer at the
//!   retry delay

use tokio::sync::{mpsc, oneshot};

use std::sync::Arc;

use vitrine_core::config::SessionConfig;
use vitrine_core::{Error, IoContext, Result};

use crate::models::{validate_message_payload, ArchiveRecord, Message, MessageRole};
use crate::pipeline::{Answer, AnswerPipeline, AnswerRequest, ANSWER_FALLBACK};
use crate::storage::{ArchiveStore, HotBuffer};

/// Operations accepted by a session actor
pub enum SessionOp {
    /// Append a message without answering it
    Append {
        role: MessageRole,
        content: String,
        image_base64: Option<String>,
        reply: oneshot::Sender<Result<Message>>,
    },
    /// Read the transcript ordered by timestamp
    Read {
        reply: oneshot::Sender<Result<Vec<Message>>>,
    },
    /// Append a turn and, for user turns, answer it through the pipeline
    HandleTurn {
        role: MessageRole,
        content: String,
        image_base64: Option<String>,
        reply: oneshot::Sender<Result<TurnOutcome>>,
    },
    /// Observability snapshot
    Stats {
        reply: oneshot::Sender<Result<SessionStats>>,
    },
    /// Timer-driven archive sync
    Flush,
}

/// Result of a handled turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub ok: bool,
    /// Pipeline answer for user turns; `None` for other roles and fallbacks
    pub answer: Option<Answer>,
    /// Full transcript after the turn
    pub messages: Vec<Message>,
}

/// Observability snapshot of one session
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub message_count: usize,
    pub unsynced_count: usize,
    pub flush_timer_armed: bool,
}

/// One session's actor state
pub struct SessionActor {
    session_id: String,
    customer_id: Option<String>,
    hot: Arc<dyn HotBuffer>,
    archive: Arc<dyn ArchiveStore>,
    pipeline: Arc<AnswerPipeline>,
    io: IoContext,
    config: SessionConfig,
    /// Sender back into this actor's own mailbox, used by flush timers
    self_tx: mpsc::Sender<SessionOp>,
    flush_timer_armed: bool,
    /// Highest timestamp handed out; keeps transcript order strict even when
    /// the clock does not advance between appends
    last_timestamp_ms: u64,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        hot: Arc<dyn HotBuffer>,
        archive: Arc<dyn ArchiveStore>,
        pipeline: Arc<AnswerPipeline>,
        io: IoContext,
        config: SessionConfig,
        self_tx: mpsc::Sender<SessionOp>,
    ) -> Self {
        assert!(!session_id.is_empty(), "session_id must not be empty");

        Self {
            session_id,
            customer_id: None,
            hot,
            archive,
            pipeline,
            io,
            config,
            self_tx,
            flush_timer_armed: false,
            last_timestamp_ms: 0,
        }
    }

    /// Mailbox loop; consumes the actor
    pub async fn run(mut self, mut rx: mpsc::Receiver<SessionOp>) {
        if let Err(e) = self.activate().await {
            tracing::error!(session_id = %self.session_id, error = %e, "activation failed");
        }

        while let Some(op) = rx.recv().await {
            self.handle(op).await;
        }

        tracing::debug!(session_id = %self.session_id, "session actor stopped");
    }

    /// Rehydrate an empty hot buffer from the archive
    async fn activate(&mut self) -> Result<()> {
        let count = self
            .hot
            .count(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?;
        if count > 0 {
            self.last_timestamp_ms = self
                .hot
                .messages(&self.session_id)
                .await
                .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?
                .last()
                .map(|m| m.timestamp_ms)
                .unwrap_or(0);
            return Ok(());
        }

        let Some(record) = self
            .archive
            .load(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?
        else {
            return Ok(());
        };

        self.customer_id = record.customer_id.clone();

        let skip = record
            .messages
            .len()
            .saturating_sub(self.config.hot_context_messages_count);
        for message in record.messages.iter().skip(skip) {
            let mut message = message.clone();
            message.synced = true; // already archived, must not re-trigger a flush
            self.hot
                .insert(&message)
                .await
                .map_err(|e| Error::storage_write_failed(&self.session_id, e.to_string()))?;
            self.last_timestamp_ms = self.last_timestamp_ms.max(message.timestamp_ms);
        }

        tracing::info!(
            session_id = %self.session_id,
            messages = record.messages.len().min(self.config.hot_context_messages_count),
            "session rehydrated from archive"
        );
        Ok(())
    }

    async fn handle(&mut self, op: SessionOp) {
        match op {
            SessionOp::Append {
                role,
                content,
                image_base64,
                reply,
            } => {
                let result = self.append(role, content, image_base64).await;
                let _ = reply.send(result);
            }
            SessionOp::Read { reply } => {
                let _ = reply.send(self.read().await);
            }
            SessionOp::HandleTurn {
                role,
                content,
                image_base64,
                reply,
            } => {
                let result = self.handle_turn(role, content, image_base64).await;
                let _ = reply.send(result);
            }
            SessionOp::Stats { reply } => {
                let _ = reply.send(self.stats().await);
            }
            SessionOp::Flush => {
                self.flush().await;
            }
        }
    }

    /// Append one message and arm the flush timer
    async fn append(
        &mut self,
        role: MessageRole,
        content: String,
        image_base64: Option<String>,
    ) -> Result<Message> {
        validate_message_payload(&content, image_base64.as_deref())?;

        // Strictly increasing timestamps keep read() order stable under
        // bursts faster than the clock resolution
        let timestamp_ms = self.io.now_ms().max(self.last_timestamp_ms + 1);
        self.last_timestamp_ms = timestamp_ms;

        let message = Message {
            id: self.io.gen_uuid(),
            session_id: self.session_id.clone(),
            role,
            content,
            image_base64,
            timestamp_ms,
            synced: false,
        };

        self.hot
            .insert(&message)
            .await
            .map_err(|e| Error::storage_write_failed(&self.session_id, e.to_string()))?;

        self.arm_flush_timer(self.config.flush_delay_ms);
        Ok(message)
    }

    async fn read(&self) -> Result<Vec<Message>> {
        self.hot
            .messages(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))
    }

    /// Append a turn; user turns are answered through the pipeline
    async fn handle_turn(
        &mut self,
        role: MessageRole,
        content: String,
        image_base64: Option<String>,
    ) -> Result<TurnOutcome> {
        self.append(role, content.clone(), image_base64.clone())
            .await?;

        let mut answer = None;
        if role == MessageRole::User {
            let request = AnswerRequest {
                query: Some(content),
                image_base64,
                session_id: self.session_id.clone(),
            };

            match self.pipeline.answer(&request).await {
                Ok(a) => {
                    self.append(MessageRole::Assistant, a.text.clone(), None)
                        .await?;
                    answer = Some(a);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %e,
                        "pipeline failed, replying with fallback"
                    );
                    self.append(MessageRole::Assistant, ANSWER_FALLBACK.to_string(), None)
                        .await?;
                }
            }
        }

        Ok(TurnOutcome {
            ok: true,
            answer,
            messages: self.read().await?,
        })
    }

    async fn stats(&self) -> Result<SessionStats> {
        let message_count = self
            .hot
            .count(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?;
        let unsynced_count = self
            .hot
            .unsynced_count(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?;

        Ok(SessionStats {
            message_count,
            unsynced_count,
            flush_timer_armed: self.flush_timer_armed,
        })
    }

    /// Archive sync: runs only from the Flush envelope, never on the
    /// response path
    async fn flush(&mut self) {
        self.flush_timer_armed = false;

        if let Err(e) = self.flush_inner().await {
            tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                retry_delay_ms = self.config.flush_retry_delay_ms,
                "flush failed, rescheduling"
            );
            self.arm_flush_timer(self.config.flush_retry_delay_ms);
        }
    }

    async fn flush_inner(&mut self) -> Result<()> {
        let batch = self
            .hot
            .unsynced(&self.session_id, self.config.archive_batch_count_max)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?;

        if batch.is_empty() {
            // Nothing new to archive; just enforce the hot window
            self.hot
                .trim_to_recent(&self.session_id, self.config.hot_context_messages_count)
                .await
                .map_err(|e| Error::storage_write_failed(&self.session_id, e.to_string()))?;
            return Ok(());
        }

        let transcript = self
            .hot
            .messages(&self.session_id)
            .await
            .map_err(|e| Error::storage_read_failed(&self.session_id, e.to_string()))?;
        debug_assert!(!transcript.is_empty());

        let record = ArchiveRecord {
            session_id: self.session_id.clone(),
            customer_id: self.customer_id.clone(),
            messages: transcript.clone(),
            started_at_ms: transcript.first().map(|m| m.timestamp_ms).unwrap_or(0),
            last_write_ms: self.io.now_ms(),
        };

        // Order matters: nothing is marked synced until the archive write
        // has succeeded, so a failure changes no buffer state
        self.archive
            .upsert(&record)
            .await
            .map_err(|e| Error::archive_write_failed(&self.session_id, e.to_string()))?;

        let ids: Vec<String> = batch.iter().map(|m| m.id.clone()).collect();
        self.hot
            .mark_synced(&self.session_id, &ids)
            .await
            .map_err(|e| Error::storage_write_failed(&self.session_id, e.to_string()))?;
        self.hot
            .trim_to_recent(&self.session_id, self.config.hot_context_messages_count)
            .await
            .map_err(|e| Error::storage_write_failed(&self.session_id, e.to_string()))?;

        tracing::info!(
            session_id = %self.session_id,
            batch = ids.len(),
            transcript = transcript.len(),
            "archived session transcript"
        );
        Ok(())
    }

    /// Arm the flush timer; idempotent while a timer is pending
    fn arm_flush_timer(&mut self, delay_ms: u64) {
        if self.flush_timer_armed {
            return;
        }
        self.flush_timer_armed = true;

        let tx = self.self_tx.clone();
        let time = self.io.time.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            time.sleep_ms(delay_ms).await;
            if tx.send(SessionOp::Flush).await.is_err() {
                tracing::debug!(session_id = %session_id, "session gone before flush fired");
            }
        });
    }
}
