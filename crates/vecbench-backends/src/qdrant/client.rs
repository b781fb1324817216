//! JSON-over-REST boundary to a Qdrant server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

/// Errors from the Qdrant REST boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QdrantApiError {
    #[error("qdrant returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("qdrant transport error: {0}")]
    Transport(String),

    #[error("qdrant response decode error: {0}")]
    Decode(String),
}

impl QdrantApiError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        QdrantApiError::Status {
            status,
            body: body.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QdrantApiError::Status { status: 404, .. })
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, QdrantApiError::Status { status: 429 | 503, .. })
    }
}

/// One REST call. Returns the `result` member of Qdrant's response envelope.
#[async_trait]
pub trait QdrantApi: Send + Sync {
    async fn call(&self, method: Method, path: &str, body: Option<Value>)
        -> Result<Value, QdrantApiError>;

    /// Base URL calls are sent to.
    fn endpoint(&self) -> String;

    /// True when no Qdrant server is behind this client.
    fn is_emulated(&self) -> bool {
        false
    }
}

/// reqwest-backed client.
pub struct QdrantHttp {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl QdrantHttp {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QdrantApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vecbench/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| QdrantApiError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }
}

#[async_trait]
impl QdrantApi for QdrantHttp {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, QdrantApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "qdrant request");
        let mut request = self.http.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| QdrantApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantApiError::status(status.as_u16(), body));
        }
        let mut envelope: Value = response
            .json()
            .await
            .map_err(|e| QdrantApiError::Decode(e.to_string()))?;
        Ok(envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(QdrantApiError::status(404, "").is_not_found());
        assert!(QdrantApiError::status(429, "").is_throttled());
        assert!(!QdrantApiError::status(400, "").is_throttled());
        assert!(!QdrantApiError::Transport("reset".into()).is_not_found());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = QdrantHttp::new("http://localhost:6333/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://localhost:6333");
        assert_eq!(client.endpoint(), "http://localhost:6333");
        assert!(!client.is_emulated());
    }
}
