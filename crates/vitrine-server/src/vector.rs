//! Vector index client
//!
//! Similarity search over the product knowledge base. An empty result set is
//! a valid outcome, not an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use vitrine_core::http::HttpClient;
use vitrine_core::{Error, Result};

/// One similarity match with its snippet text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    /// Snippet text carried in the match metadata
    #[serde(default)]
    pub text: String,
}

/// Vector index seam
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Query the `top_k` nearest matches for an embedding
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;
}

/// HTTP vector index client (Vectorize-style query endpoint)
pub struct HttpVectorIndex {
    http: Arc<dyn HttpClient>,
    url: String,
}

impl HttpVectorIndex {
    pub fn new(http: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        let url = url.into();
        assert!(!url.is_empty(), "vector index URL must not be empty");
        Self { http, url }
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        assert!(top_k > 0, "top_k must be positive");

        let body = json!({
            "vector": embedding,
            "topK": top_k,
            "returnMetadata": true,
        });

        let response = self
            .http
            .post_json(&self.url, &body)
            .await
            .map_err(|e| Error::VectorSearchFailed {
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(Error::VectorSearchFailed {
                reason: format!("status {}: {}", response.status, response.body),
            });
        }

        let body = response.json().map_err(|e| Error::VectorSearchFailed {
            reason: format!("invalid JSON: {e}"),
        })?;

        let matches = body
            .get("matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(matches
            .iter()
            .map(|m| VectorMatch {
                id: m
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: m.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                text: m
                    .pointer("/metadata/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }
}

/// Concatenate match snippets into a grounding context block
pub fn context_from_matches(matches: &[VectorMatch]) -> String {
    matches
        .iter()
        .map(|m| m.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
