//! Inference client: chat completions, vision and embeddings
//!
//! TigerStyle: Explicit configuration, OpenAI-compatible API surface.
//! All wire traffic goes through the HttpClient trait so tests can script
//! responses and inject faults.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use vitrine_core::http::HttpClient;
use vitrine_core::{Error, PipelineConfig, Result};

/// Chat message for the completion API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Set on `tool` role messages carrying a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Tool definition advertised to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tool call requested by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Response from a chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Inference provider seam
///
/// Covers the three model calls the pipeline makes: image description,
/// embedding and tool-augmented chat.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Describe an image in a short piece of text
    async fn describe_image(&self, prompt: &str, image_base64: &str) -> Result<String>;

    /// Embed a text into a vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Run a chat completion, optionally advertising tools
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<ChatCompletion>;
}

/// OpenAI-compatible HTTP inference client
pub struct HttpInferenceClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    vision_model: String,
    embedding_model: String,
    completion_tokens_max: u32,
}

impl HttpInferenceClient {
    pub fn new(http: Arc<dyn HttpClient>, config: &PipelineConfig) -> Self {
        assert!(!config.inference_url.is_empty(), "inference_url must be set");

        Self {
            http,
            base_url: config.inference_url.trim_end_matches('/').to_string(),
            api_key: config.inference_api_key.clone(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            embedding_model: config.embedding_model.clone(),
            completion_tokens_max: config.completion_tokens_max,
        }
    }

    async fn post(&self, path: &str, body: Value, operation: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = vitrine_core::http::HttpRequest::post(url).with_json_body(&body);
        if let Some(key) = &self.api_key {
            request = request.with_bearer(key);
        }

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::inference_failed(operation, e.to_string()))?;

        if !response.is_success() {
            return Err(Error::inference_failed(
                operation,
                format!("status {}: {}", response.status, response.body),
            ));
        }

        response
            .json()
            .map_err(|e| Error::inference_failed(operation, format!("invalid JSON: {e}")))
    }

    fn parse_completion(body: &Value, operation: &str) -> Result<ChatCompletion> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| Error::inference_failed(operation, "missing choices[0].message"))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let name = call
                    .pointer("/function/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = call
                    .pointer("/function/arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let input =
                    serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
                tool_calls.push(ToolCall { id, name, input });
            }
        }

        Ok(ChatCompletion {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn describe_image(&self, prompt: &str, image_base64: &str) -> Result<String> {
        let body = json!({
            "model": self.vision_model,
            "max_tokens": self.completion_tokens_max,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{image_base64}") }
                    }
                ]
            }]
        });

        let response = self.post("/chat/completions", body, "describe_image").await?;
        response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::inference_failed("describe_image", "empty response"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });

        let response = self.post("/embeddings", body, "embed").await?;
        let embedding = response
            .pointer("/data/0/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::inference_failed("embed", "missing data[0].embedding"))?;

        Ok(embedding
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatCompletion> {
        let mut body = json!({
            "model": self.chat_model,
            "max_tokens": self.completion_tokens_max,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
        }

        let response = self.post("/chat/completions", body, "chat").await?;
        Self::parse_completion(&response, "chat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use vitrine_core::http::{HttpError, HttpRequest, HttpResponse, HttpResult};

    /// Scripted HTTP client: pops queued responses in order
    struct ScriptedHttp {
        responses: Mutex<VecDeque<HttpResult<HttpResponse>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttp {
        fn new(responses: Vec<HttpResult<HttpResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(HttpError::RequestFailed {
                        reason: "no scripted response".into(),
                    })
                })
        }
    }

    fn client(http: Arc<dyn HttpClient>) -> HttpInferenceClient {
        HttpInferenceClient::new(http, &PipelineConfig::default())
    }

    #[tokio::test]
    async fn test_chat_parses_content() {
        let http = Arc::new(ScriptedHttp::new(vec![Ok(HttpResponse::new(
            200,
            r#"{"choices":[{"message":{"content":"hello there"}}]}"#,
        ))]));
        let inference = client(http);

        let completion = inference
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(completion.content, "hello there");
        assert!(completion.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_chat_parses_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "get_customer_context",
                            "arguments": "{\"session_id\":\"s1\",\"limit\":5}"
                        }
                    }]
                }
            }]
        }"#;
        let http = Arc::new(ScriptedHttp::new(vec![Ok(HttpResponse::new(200, body))]));
        let inference = client(http);

        let completion = inference
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "get_customer_context");
        assert_eq!(completion.tool_calls[0].input["limit"], 5);
    }

    #[tokio::test]
    async fn test_embed_parses_vector() {
        let http = Arc::new(ScriptedHttp::new(vec![Ok(HttpResponse::new(
            200,
            r#"{"data":[{"embedding":[0.1, 0.2, 0.3]}]}"#,
        ))]));
        let inference = client(http);

        let embedding = inference.embed("bracelets").await.unwrap();
        assert_eq!(embedding.len(), 3);
    }

    #[tokio::test]
    async fn test_http_failure_surfaces_as_inference_error() {
        let http = Arc::new(ScriptedHttp::new(vec![Ok(HttpResponse::new(
            503,
            "overloaded",
        ))]));
        let inference = client(http);

        let err = inference
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.is_retriable());
    }
}
