//! Language-model completion boundary.
//!
//! Defines the [`CompletionClient`] trait that every model-backed step goes
//! through (intent fallback, query generation, response synthesis, the tool
//! agent) and an OpenAI-compatible implementation.
//!
//! # Retry Strategy
//!
//! [`OpenAiCompletion`] wraps each request in [`with_retry`]:
//! - HTTP 429 and 5xx → retry
//! - HTTP 4xx (not 429) → fail immediately
//! - Network errors and per-attempt timeouts → retry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// System prompt, prior turns and the new user message for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Prior turns, oldest first.
    pub history: Vec<Message>,
    pub user_content: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Temperature 0.1, no history, no token limit.
    pub fn new(system_prompt: impl Into<String>, user_content: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            user_content: user_content.into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A chat completion service: one request in, one text blob out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenAiCompletion {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::MissingApiKey`] when the configured
    /// environment variable is unset.
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| CompletionError::MissingApiKey(config.api_key_env.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            retry: config.retry_policy(),
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": request.system_prompt }));
        for turn in &request.history {
            messages.push(serde_json::json!({ "role": turn.role, "content": turn.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user_content }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = self.request_body(request);
        debug!(model = %self.model, turns = request.history.len(), "requesting completion");
        with_retry(&self.retry, "chat.completions", |_| self.send_once(&body)).await
    }
}

/// Extract `choices[0].message.content`. Empty content counts as malformed.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, CompletionError> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".into()))?;

    if content.trim().is_empty() {
        return Err(CompletionError::Malformed("empty completion".into()));
    }
    Ok(content.to_string())
}

/// Strip a surrounding markdown code fence (```` ```json ````, ```` ```sql ````,
/// or bare ```` ``` ````) from model output.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let start = text.find('\n').map(|i| i + 1).unwrap_or(3);
    let inner = &text[start..];
    let end = inner.rfind("```").unwrap_or(inner.len());
    inner[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Warm pool." } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Warm pool.");
    }

    #[test]
    fn test_parse_chat_response_empty_is_malformed() {
        let json = serde_json::json!({ "choices": [{ "message": { "content": "  " } }] });
        assert!(matches!(
            parse_chat_response(&json),
            Err(CompletionError::Malformed(_))
        ));
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```sql\nSELECT * FROM argo_profiles\n```"),
            "SELECT * FROM argo_profiles"
        );
        assert_eq!(
            strip_code_fence("```\n{\"intent\": \"sql\"}\n```"),
            "{\"intent\": \"sql\"}"
        );
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn test_request_body_orders_turns() {
        let client = OpenAiCompletion {
            client: reqwest::Client::new(),
            base_url: "http://localhost".into(),
            model: "gpt-4".into(),
            api_key: "k".into(),
            retry: RetryPolicy::default(),
        };
        let req = CompletionRequest::new("sys", "now")
            .with_history(vec![Message::user("before"), Message::assistant("reply")])
            .with_max_tokens(1000);
        let body = client.request_body(&req);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(body["max_tokens"], 1000);
    }
}
