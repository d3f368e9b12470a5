//! Deterministic simulation collaborators
//!
//! TigerStyle: Explicit time control, scripted responses, no sockets.
//!
//! Everything the session actor and the pipeline talk to exists here in a
//! deterministic form: a manually advanced clock plus scripted inference,
//! vector, knowledge and analytics clients with call counters and
//! per-call failure injection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use vitrine_core::constants::EMBEDDING_DIMENSIONS_COUNT;
use vitrine_core::io::TimeProvider;
use vitrine_core::{Error, Result};

use crate::analytics::AnalyticsClient;
use crate::inference::{ChatCompletion, ChatMessage, InferenceClient, ToolCall, ToolDefinition};
use crate::knowledge::{KnowledgeClient, KNOWLEDGE_TOOL_ANSWER};
use crate::vector::{VectorIndex, VectorMatch};

// ============================================================================
// Simulation Clock
// ============================================================================

/// Deterministic simulation clock
///
/// Time only advances when explicitly told to. Sleepers wait on a notify and
/// recheck the deadline, so a single `advance_ms` past a flush deadline wakes
/// the flush timer exactly once.
#[derive(Debug, Clone)]
pub struct SimClock {
    current_time_ms: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a clock starting at the given time
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self::from_millis(start_time.timestamp_millis() as u64)
    }

    /// Create a clock starting at a specific millisecond timestamp
    pub fn from_millis(ms: u64) -> Self {
        Self {
            current_time_ms: Arc::new(AtomicU64::new(ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Advance time by the given number of milliseconds
    pub fn advance_ms(&self, ms: u64) {
        self.current_time_ms.fetch_add(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Current time as a chrono timestamp
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms() as i64)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
    }
}

impl Default for SimClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC for predictable test timestamps
        Self::from_millis(1_704_067_200_000)
    }
}

#[async_trait]
impl TimeProvider for SimClock {
    fn now_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        let target_ms = self.now_ms() + ms;
        loop {
            // Register the waiter before rechecking the deadline, so an
            // advance landing in between still wakes this sleeper
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.now_ms() >= target_ms {
                return;
            }
            notified.await;
        }
    }
}

// ============================================================================
// Simulated Inference
// ============================================================================

/// Scripted inference client
///
/// Chat completions are popped from a queue; an empty queue yields a fixed
/// text answer. Embeddings are deterministic hashes of the input text.
#[derive(Default)]
pub struct SimInference {
    completions: Mutex<VecDeque<ChatCompletion>>,
    descriptions: Mutex<VecDeque<String>>,
    fail_describe_remaining: AtomicU64,
    fail_embed_remaining: AtomicU64,
    fail_chat_remaining: AtomicU64,
    chat_calls: AtomicU64,
    embed_calls: AtomicU64,
    describe_calls: AtomicU64,
    last_chat_messages: Mutex<Vec<ChatMessage>>,
}

impl SimInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text completion
    pub fn push_completion(&self, content: &str) {
        self.completions
            .lock()
            .unwrap()
            .push_back(ChatCompletion::text(content));
    }

    /// Queue a completion that requests one tool call
    pub fn push_tool_call_completion(&self, name: &str, input: Value) {
        self.completions.lock().unwrap().push_back(ChatCompletion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: format!("call_{name}"),
                name: name.to_string(),
                input,
            }],
        });
    }

    /// Queue an image description
    pub fn push_description(&self, description: &str) {
        self.descriptions
            .lock()
            .unwrap()
            .push_back(description.to_string());
    }

    pub fn fail_next_describe(&self, n: u64) {
        self.fail_describe_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_embed(&self, n: u64) {
        self.fail_embed_remaining.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_chat(&self, n: u64) {
        self.fail_chat_remaining.store(n, Ordering::SeqCst);
    }

    pub fn chat_calls(&self) -> u64 {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> u64 {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> u64 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Messages of the most recent chat call
    pub fn last_chat_messages(&self) -> Vec<ChatMessage> {
        self.last_chat_messages.lock().unwrap().clone()
    }

    fn take_fault(counter: &AtomicU64) -> bool {
        let remaining = counter.load(Ordering::SeqCst);
        if remaining > 0 {
            counter.store(remaining - 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl InferenceClient for SimInference {
    async fn describe_image(&self, _prompt: &str, _image_base64: &str) -> Result<String> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_describe_remaining) {
            return Err(Error::inference_failed("describe_image", "injected fault"));
        }
        Ok(self
            .descriptions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "a handmade silver bracelet with blue stones".to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_fault(&self.fail_embed_remaining) {
            return Err(Error::inference_failed("embed", "injected fault"));
        }

        // FNV-style hash per dimension, normalized: same text, same vector
        let mut embedding = Vec::with_capacity(EMBEDDING_DIMENSIONS_COUNT);
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(0x0000_0100_0000_01b3);
        }
        for dim in 0..EMBEDDING_DIMENSIONS_COUNT {
            let mixed = state.wrapping_add(dim as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            embedding.push(((mixed >> 40) as f32 / (1u64 << 24) as f32) - 0.5);
        }
        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        Ok(embedding)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatCompletion> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_chat_messages.lock().unwrap() = messages.to_vec();

        if Self::take_fault(&self.fail_chat_remaining) {
            return Err(Error::inference_failed("chat", "injected fault"));
        }

        Ok(self
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatCompletion::text("simulated answer")))
    }
}

// ============================================================================
// Simulated Vector Index
// ============================================================================

/// Scripted vector index returning a fixed match set
#[derive(Default)]
pub struct SimVectorIndex {
    matches: Mutex<Vec<VectorMatch>>,
    query_calls: AtomicU64,
}

impl SimVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_matches(&self, matches: Vec<VectorMatch>) {
        *self.matches.lock().unwrap() = matches;
    }

    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for SimVectorIndex {
    async fn query(&self, _embedding: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let matches = self.matches.lock().unwrap();
        Ok(matches.iter().take(top_k).cloned().collect())
    }
}

// ============================================================================
// Simulated Knowledge Proxy
// ============================================================================

/// Scripted knowledge proxy
#[derive(Default)]
pub struct SimKnowledge {
    answer: Mutex<Option<String>>,
    products: Mutex<HashMap<String, Value>>,
    fail_remaining: AtomicU64,
    call_count: AtomicU64,
}

impl SimKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_answer(&self, answer: &str) {
        *self.answer.lock().unwrap() = Some(answer.to_string());
    }

    pub fn add_product(&self, title: &str, product: Value) {
        self.products
            .lock()
            .unwrap()
            .insert(title.to_string(), product);
    }

    pub fn fail_next(&self, n: u64) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeClient for SimKnowledge {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::KnowledgeUnavailable {
                reason: "injected fault".into(),
            });
        }

        match name {
            KNOWLEDGE_TOOL_ANSWER => {
                let answer = self.answer.lock().unwrap().clone().unwrap_or_default();
                Ok(json!({ "answer": answer }))
            }
            _ => {
                let title = arguments
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                match self.products.lock().unwrap().get(title) {
                    Some(product) => Ok(product.clone()),
                    None => Err(Error::KnowledgeUnavailable {
                        reason: format!("no product: {title}"),
                    }),
                }
            }
        }
    }
}

// ============================================================================
// Simulated Analytics
// ============================================================================

/// Scripted analytics service
#[derive(Default)]
pub struct SimAnalytics {
    events: Mutex<HashMap<String, Vec<Value>>>,
    fail_remaining: AtomicU64,
}

impl SimAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, session_id: &str, event: Value) {
        self.events
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(event);
    }

    pub fn fail_next(&self, n: u64) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalyticsClient for SimAnalytics {
    async fn recent_events(&self, session_id: &str, limit: u32) -> Result<Vec<Value>> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::AnalyticsFailed {
                reason: "injected fault".into(),
            });
        }

        let events = self.events.lock().unwrap();
        Ok(events
            .get(session_id)
            .map(|e| e.iter().rev().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advance() {
        let clock = SimClock::from_millis(0);
        assert_eq!(clock.now_ms(), 0);
        clock.advance_ms(1500);
        assert_eq!(clock.now_ms(), 1500);
    }

    #[tokio::test]
    async fn test_clock_sleep_waits_for_advance() {
        let clock = SimClock::from_millis(0);
        let sleeper = clock.clone();

        let handle = tokio::spawn(async move {
            sleeper.sleep_ms(100).await;
            sleeper.now_ms()
        });

        tokio::task::yield_now().await;
        clock.advance_ms(50);
        tokio::task::yield_now().await;
        clock.advance_ms(50);

        assert!(handle.await.unwrap() >= 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clock_advance_racing_a_sleeper_is_never_lost() {
        // An advance landing between a sleeper's deadline check and its wait
        // must still wake it; a lost notification would hang this test.
        for _ in 0..200 {
            let clock = SimClock::from_millis(0);
            let sleeper = clock.clone();
            let handle = tokio::spawn(async move { sleeper.sleep_ms(10).await });
            clock.advance_ms(10);
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sim_embed_deterministic() {
        let inference = SimInference::new();
        let a = inference.embed("bracelets").await.unwrap();
        let b = inference.embed("bracelets").await.unwrap();
        let c = inference.embed("rings").await.unwrap();

        assert_eq!(a.len(), EMBEDDING_DIMENSIONS_COUNT);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_sim_inference_scripted_completions() {
        let inference = SimInference::new();
        inference.push_completion("first");

        let one = inference.chat(&[], &[]).await.unwrap();
        let two = inference.chat(&[], &[]).await.unwrap();
        assert_eq!(one.content, "first");
        assert_eq!(two.content, "simulated answer");
        assert_eq!(inference.chat_calls(), 2);
    }

    #[tokio::test]
    async fn test_sim_knowledge_fault_then_recovery() {
        let knowledge = SimKnowledge::new();
        knowledge.set_answer("in stock");
        knowledge.fail_next(1);

        assert!(knowledge.ask("q", "", "s1").await.is_err());
        assert_eq!(knowledge.ask("q", "", "s1").await.unwrap().unwrap(), "in stock");
    }

    #[tokio::test]
    async fn test_sim_analytics_limit_and_order() {
        let analytics = SimAnalytics::new();
        for i in 0..5 {
            analytics.add_event("s1", json!({ "seq": i }));
        }

        let events = analytics.recent_events("s1", 2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["seq"], 4);
    }
}
