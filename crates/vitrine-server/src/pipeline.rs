//! Answer pipeline
//!
//! Turns one user turn (text, image, or both) into an assistant answer:
//! cache check, visual analysis, embedding, vector search, knowledge query,
//! one tool-augmented LLM round trip, cache write.
//!
//! Only a fully failed pipeline surfaces as an error; the session actor maps
//! that to the fixed fallback reply. Optional collaborators degrade to
//! skipped steps, logged and tagged in the result.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use vitrine_core::constants::TOOL_ROUND_TRIPS_COUNT_MAX;
use vitrine_core::{Error, PipelineConfig, Result};

use crate::inference::{ChatMessage, InferenceClient};
use crate::knowledge::KnowledgeClient;
use crate::storage::AnswerCache;
use crate::tools::ToolRegistry;
use crate::vector::{context_from_matches, VectorIndex};

/// Reply used when the model produces nothing usable
pub const ANSWER_FALLBACK: &str = "I could not find an answer to that.";

/// Visual-analysis text substituted when the vision call fails
pub const VISUAL_ANALYSIS_FALLBACK: &str = "The image could not be analyzed.";

const VISION_PROMPT: &str = "Describe the style, material and stones of the pictured \
    jewelry in one short plain-text paragraph, without JSON, to enrich a product query.";

/// Where the final answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerSource {
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "mcp+llm")]
    McpLlm,
    #[serde(rename = "llm+tool")]
    LlmTool,
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerSource::Cache => write!(f, "cache"),
            AnswerSource::Llm => write!(f, "llm"),
            AnswerSource::McpLlm => write!(f, "mcp+llm"),
            AnswerSource::LlmTool => write!(f, "llm+tool"),
        }
    }
}

/// One answer request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Text query; at least one of query and image must be present
    pub query: Option<String>,
    /// Inline image, base64-encoded
    pub image_base64: Option<String>,
    /// Requesting session, passed to knowledge and tools
    pub session_id: String,
}

/// One computed answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// Whether any grounding context (vector or knowledge) was available
    pub context_used: bool,
    /// Visual-analysis text, present when an image was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_analysis: Option<String>,
}

/// The retrieval-augmented answer pipeline
pub struct AnswerPipeline {
    inference: Arc<dyn InferenceClient>,
    vector: Option<Arc<dyn VectorIndex>>,
    knowledge: Option<Arc<dyn KnowledgeClient>>,
    cache: Arc<dyn AnswerCache>,
    tools: Arc<ToolRegistry>,
    config: PipelineConfig,
}

impl AnswerPipeline {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        vector: Option<Arc<dyn VectorIndex>>,
        knowledge: Option<Arc<dyn KnowledgeClient>>,
        cache: Arc<dyn AnswerCache>,
        tools: Arc<ToolRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inference,
            vector,
            knowledge,
            cache,
            tools,
            config,
        }
    }

    /// Answer one turn
    pub async fn answer(&self, request: &AnswerRequest) -> Result<Answer> {
        let query = request.query.as_deref().filter(|q| !q.is_empty());
        let image = request.image_base64.as_deref().filter(|i| !i.is_empty());

        // Reject before any side effect
        if query.is_none() && image.is_none() {
            return Err(Error::EmptyTurn);
        }

        let text_only = query.is_some() && image.is_none();

        // 1. Cache check, text-only queries. A cache read error is a miss.
        if text_only {
            let query = query.unwrap_or_default();
            match self.cache.get(query).await {
                Ok(Some(cached)) => {
                    tracing::debug!(session_id = %request.session_id, "cache hit");
                    return Ok(Answer {
                        text: cached,
                        source: AnswerSource::Cache,
                        context_used: false,
                        visual_analysis: None,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %request.session_id, error = %e, "cache read failed");
                }
            }
        }

        // 2. Visual analysis, non-fatal
        let visual_analysis = match image {
            Some(image) => Some(self.describe_image(image, &request.session_id).await),
            None => None,
        };
        let visual_text = visual_analysis.as_deref().unwrap_or_default();

        // 3. Embedding over query text plus visual analysis
        let embedding_text = format!("{} {}", query.unwrap_or_default(), visual_text);
        let embedding = self.inference.embed(embedding_text.trim()).await?;

        // 4. Vector search; empty context is a valid outcome
        let vector_context = match &self.vector {
            Some(vector) => {
                let matches = vector.query(&embedding, self.config.vector_top_k).await?;
                context_from_matches(&matches)
            }
            None => String::new(),
        };

        // 5. Knowledge query, best-effort, prioritized over vector context
        let knowledge_answer = self
            .ask_knowledge(query, visual_text, &vector_context, &request.session_id)
            .await;

        // 6. LLM round trip with at most one tool call
        let (mut answer_text, used_tool) = self
            .complete(query, visual_text, &vector_context, knowledge_answer.as_deref())
            .await?;

        if answer_text.trim().is_empty() {
            answer_text = ANSWER_FALLBACK.to_string();
        }

        // 7. Cache write, text-only queries; failure only degrades future hits
        if text_only {
            if let Err(e) = self.cache.put(query.unwrap_or_default(), &answer_text).await {
                tracing::warn!(session_id = %request.session_id, error = %e, "cache write failed");
            }
        }

        let source = if used_tool {
            AnswerSource::LlmTool
        } else if knowledge_answer.is_some() {
            AnswerSource::McpLlm
        } else {
            AnswerSource::Llm
        };

        Ok(Answer {
            text: answer_text,
            source,
            context_used: !vector_context.is_empty() || knowledge_answer.is_some(),
            visual_analysis: visual_analysis.clone(),
        })
    }

    async fn describe_image(&self, image_base64: &str, session_id: &str) -> String {
        match self.inference.describe_image(VISION_PROMPT, image_base64).await {
            Ok(description) => description,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "visual analysis failed");
                VISUAL_ANALYSIS_FALLBACK.to_string()
            }
        }
    }

    async fn ask_knowledge(
        &self,
        query: Option<&str>,
        visual_text: &str,
        vector_context: &str,
        session_id: &str,
    ) -> Option<String> {
        let knowledge = self.knowledge.as_ref()?;
        let full_query = format!("{} {}", query.unwrap_or_default(), visual_text);

        match knowledge
            .ask(full_query.trim(), vector_context, session_id)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "knowledge query failed");
                None
            }
        }
    }

    /// Run the LLM, executing at most one requested tool call
    async fn complete(
        &self,
        query: Option<&str>,
        visual_text: &str,
        vector_context: &str,
        knowledge_answer: Option<&str>,
    ) -> Result<(String, bool)> {
        let system = build_system_prompt(vector_context, knowledge_answer);
        let user_content = if visual_text.is_empty() {
            query.unwrap_or_default().to_string()
        } else {
            format!("{}\nVISUAL CONTEXT: {}", query.unwrap_or_default(), visual_text)
        };

        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user_content)];
        let tool_definitions = self.tools.definitions().await;

        let completion = self.inference.chat(&messages, &tool_definitions).await?;

        let Some(call) = completion.tool_calls.first() else {
            return Ok((completion.content, false));
        };

        // Bounded tool loop: execute the first requested call, feed the
        // result back, and take whatever the next completion says. Further
        // calls requested by that completion are not executed.
        debug_assert!(TOOL_ROUND_TRIPS_COUNT_MAX == 1);

        let result = self.tools.execute(&call.name, &call.input).await;
        tracing::info!(
            tool = %call.name,
            success = result.success,
            duration_ms = result.duration_ms,
            "tool round trip"
        );

        let assistant_content = if completion.content.is_empty() {
            json!({ "tool_call": { "name": call.name, "input": call.input } }).to_string()
        } else {
            completion.content.clone()
        };
        messages.push(ChatMessage::assistant(assistant_content));
        messages.push(ChatMessage::tool_result(
            call.id.clone(),
            json!({
                "tool": call.name,
                "success": result.success,
                "output": result.output,
            })
            .to_string(),
        ));

        let final_completion = self.inference.chat(&messages, &[]).await?;
        Ok((final_completion.content, true))
    }
}

fn build_system_prompt(vector_context: &str, knowledge_answer: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are the shopping assistant for this storefront. Advise customers on the \
         catalog, help assemble sets and match items to what they are browsing. Answer \
         from the context below, preferring store data over retrieved snippets. Never \
         invent prices or availability.",
    );

    if let Some(answer) = knowledge_answer {
        prompt.push_str("\nSTORE DATA:\n");
        prompt.push_str(answer);
    }
    if !vector_context.is_empty() {
        prompt.push_str("\nRETRIEVED CONTEXT:\n");
        prompt.push_str(vector_context);
    }

    prompt
}
