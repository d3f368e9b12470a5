//! Production HTTP client
//!
//! reqwest implementation of the HttpClient trait. Business logic never uses
//! reqwest directly; everything goes through the trait.

use async_trait::async_trait;

use vitrine_core::http::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    HTTP_CLIENT_RESPONSE_BYTES_MAX,
};

/// reqwest-backed HTTP client
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        let timeout_ms = request.timeout.as_millis() as u64;

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        builder = builder.timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout { timeout_ms }
            } else if e.is_connect() {
                HttpError::ConnectionFailed {
                    reason: e.to_string(),
                }
            } else {
                HttpError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();

        if let Some(length) = response.content_length() {
            if length > HTTP_CLIENT_RESPONSE_BYTES_MAX {
                return Err(HttpError::ResponseTooLarge {
                    size: length,
                    max: HTTP_CLIENT_RESPONSE_BYTES_MAX,
                });
            }
        }

        let body = response.text().await.map_err(|e| HttpError::RequestFailed {
            reason: format!("failed to read body: {e}"),
        })?;

        if body.len() as u64 > HTTP_CLIENT_RESPONSE_BYTES_MAX {
            return Err(HttpError::ResponseTooLarge {
                size: body.len() as u64,
                max: HTTP_CLIENT_RESPONSE_BYTES_MAX,
            });
        }

        Ok(HttpResponse { status, body })
    }
}
