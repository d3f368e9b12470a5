//! HTTP client abstraction
//!
//! TigerStyle: one trait in front of every outbound HTTP call.
//!
//! Production code talks to the inference gateway, the vector index, the
//! knowledge proxy and the analytics service through this trait (reqwest
//! implementation in vitrine-server); tests script responses and inject
//! failures without sockets.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP timeout in milliseconds
pub const HTTP_CLIENT_TIMEOUT_MS_DEFAULT: u64 = 30_000;

/// Maximum response body size in bytes (10 MB)
pub const HTTP_CLIENT_RESPONSE_BYTES_MAX: u64 = 10 * 1024 * 1024;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a new GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_millis(HTTP_CLIENT_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Create a new POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_millis(HTTP_CLIENT_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Set a JSON body and matching content type
    pub fn with_json_body(mut self, json: &Value) -> Self {
        self.body = Some(json.to_string());
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a bearer token Authorization header
    pub fn with_bearer(self, token: impl AsRef<str>) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse body as JSON
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// HTTP client errors
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("HTTP request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("HTTP request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("HTTP response too large: {size} bytes (max: {max} bytes)")]
    ResponseTooLarge { size: u64, max: u64 },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Injected fault: {fault}")]
    FaultInjected { fault: String },
}

/// HTTP client result type
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Abstract HTTP client trait
///
/// Production code uses the reqwest implementation; tests use a scripted one.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse>;

    /// Convenience method for GET requests
    async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(HttpRequest::get(url)).await
    }

    /// Convenience method for POST with a JSON body
    async fn post_json(&self, url: &str, body: &Value) -> HttpResult<HttpResponse> {
        self.execute(HttpRequest::post(url).with_json_body(body))
            .await
    }
}
