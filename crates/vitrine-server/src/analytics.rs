//! Analytics service client
//!
//! Read-only lookup of recent session events, consumed by the
//! customer-context tool. Raw event ingestion lives in the analytics
//! service itself.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use vitrine_core::http::HttpClient;
use vitrine_core::{Error, Result};

/// Analytics seam
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    /// Fetch up to `limit` most recent events for a session
    async fn recent_events(&self, session_id: &str, limit: u32) -> Result<Vec<Value>>;
}

/// HTTP analytics client
pub struct HttpAnalyticsClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpAnalyticsClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        assert!(!base_url.is_empty(), "analytics URL must not be empty");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AnalyticsClient for HttpAnalyticsClient {
    async fn recent_events(&self, session_id: &str, limit: u32) -> Result<Vec<Value>> {
        assert!(!session_id.is_empty(), "session_id must not be empty");

        let url = format!(
            "{}/events?session_id={}&limit={}",
            self.base_url, session_id, limit
        );

        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| Error::AnalyticsFailed {
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(Error::AnalyticsFailed {
                reason: format!("status {}", response.status),
            });
        }

        let body = response.json().map_err(|e| Error::AnalyticsFailed {
            reason: format!("invalid JSON: {e}"),
        })?;

        Ok(body
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}
