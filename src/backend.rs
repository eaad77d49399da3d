//! Retrieval backend boundary.
//!
//! The profile database and the vector index sit behind a tool server that
//! accepts `POST {url}/mcp` with
//!
//! ```json
//! {"method": "tools/call", "params": {"name": "queryARGO", "arguments": {...}}}
//! ```
//!
//! and answers with an envelope `{success, data, error, metadata}`. A
//! [`RetrievalBackend`] performs exactly one attempt; retries and timeouts
//! are applied by [`ToolDispatcher`](crate::tools::ToolDispatcher).

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::BackendError;

#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Invoke `tool` once and return the raw response envelope.
    async fn call(&self, tool: &str, arguments: &Value) -> Result<Value, BackendError>;
}

/// [`RetrievalBackend`] over HTTP with `reqwest`.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    /// Build a client for `{config.url}/mcp`. `timeout_secs` bounds each
    /// request at the transport level.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/mcp", config.url.trim_end_matches('/')),
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RetrievalBackend for HttpBackend {
    async fn call(&self, tool: &str, arguments: &Value) -> Result<Value, BackendError> {
        let payload = serde_json::json!({
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
        });
        debug!(tool, endpoint = %self.endpoint, "calling tool server");

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response.json().await?;
        if !envelope.is_object() {
            return Err(BackendError::InvalidResponse(
                "response envelope is not a JSON object".into(),
            ));
        }
        Ok(envelope)
    }
}
