//! Knowledge proxy client
//!
//! JSON-RPC 2.0 "call a named tool" client for the external commerce
//! knowledge proxy. The pipeline treats this collaborator as best-effort:
//! failures are logged and skipped, never fatal to a turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use vitrine_core::http::HttpClient;
use vitrine_core::{Error, Result};

/// Proxy tool answering storefront questions with catalog data
pub const KNOWLEDGE_TOOL_ANSWER: &str = "storefront_answer";

/// Proxy tool resolving a product by title or handle
pub const KNOWLEDGE_TOOL_LOOKUP_PRODUCT: &str = "lookup_product";

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Knowledge proxy seam
#[async_trait]
pub trait KnowledgeClient: Send + Sync {
    /// Invoke a named proxy tool with arguments
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;

    /// Ask the proxy for an answer, passing the grounding context along
    ///
    /// Returns `None` when the proxy has nothing to say about the query.
    async fn ask(&self, query: &str, context: &str, session_id: &str) -> Result<Option<String>> {
        let result = self
            .call_tool(
                KNOWLEDGE_TOOL_ANSWER,
                json!({
                    "query": query,
                    "context": context,
                    "session_id": session_id,
                }),
            )
            .await?;

        Ok(result
            .get("answer")
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .map(str::to_string))
    }
}

/// HTTP JSON-RPC knowledge client with bearer-token auth
pub struct HttpKnowledgeClient {
    http: Arc<dyn HttpClient>,
    url: String,
    api_key: String,
    next_id: AtomicU64,
}

impl HttpKnowledgeClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let url = url.into();
        assert!(!url.is_empty(), "knowledge URL must not be empty");

        Self {
            http,
            url,
            api_key: api_key.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl KnowledgeClient for HttpKnowledgeClient {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        assert!(!name.is_empty(), "tool name must not be empty");

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: "tools/call",
            params: json!({ "name": name, "arguments": arguments }),
        };
        let body = serde_json::to_value(&request).map_err(|e| Error::SerializationFailed {
            reason: e.to_string(),
        })?;

        let response = self
            .http
            .execute(
                vitrine_core::http::HttpRequest::post(&self.url)
                    .with_json_body(&body)
                    .with_bearer(&self.api_key),
            )
            .await
            .map_err(|e| Error::KnowledgeUnavailable {
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(Error::KnowledgeUnavailable {
                reason: format!("status {}", response.status),
            });
        }

        let rpc: RpcResponse =
            serde_json::from_str(&response.body).map_err(|e| Error::KnowledgeUnavailable {
                reason: format!("invalid JSON-RPC response: {e}"),
            })?;

        if let Some(err) = rpc.error {
            return Err(Error::KnowledgeUnavailable {
                reason: format!("rpc error {}: {}", err.code, err.message),
            });
        }

        rpc.result.ok_or_else(|| Error::KnowledgeUnavailable {
            reason: "rpc response missing result".into(),
        })
    }
}
