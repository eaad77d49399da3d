//! Error types for the boundaries whose failures callers must classify.
//!
//! Application glue (config loading, CLI, server start-up) uses `anyhow`.
//! The types here exist so that retry logic can tell transient failures
//! from permanent ones, and so that tool validation failures can be turned
//! into failed [`ToolResult`](crate::protocol::ToolResult)s.

use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryableError;

/// Failure talking to the retrieval tool server.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl RetryableError for BackendError {
    fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) | BackendError::Timeout(_) => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::InvalidResponse(_) => false,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        BackendError::Timeout(limit)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

/// Failure talking to the language-model completion service.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("completion API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion output: {0}")]
    Malformed(String),

    #[error("{0} environment variable not set")]
    MissingApiKey(String),
}

impl RetryableError for CompletionError {
    fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) | CompletionError::Timeout(_) => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Malformed(_) | CompletionError::MissingApiKey(_) => false,
        }
    }

    fn timed_out(limit: Duration) -> Self {
        CompletionError::Timeout(limit)
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CompletionError::Malformed(e.to_string())
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

/// A tool call rejected before reaching the backend.
#[derive(Error, Debug, PartialEq)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{tool}: missing required argument '{argument}'")]
    MissingArgument { tool: String, argument: String },

    #[error("{tool}: argument '{argument}' must be of type '{expected}', got {actual}")]
    InvalidArgument {
        tool: String,
        argument: String,
        expected: String,
        actual: String,
    },

    #[error("{0}: arguments must be a JSON object")]
    ArgumentsNotObject(String),
}

/// One `TOOL_CALL:` occurrence that could not be turned into a call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolCallParseError {
    #[error("invalid JSON after marker at byte {offset}: {message}")]
    InvalidJson { offset: usize, message: String },

    #[error("tool call at byte {0} is not a JSON object")]
    NotAnObject(usize),

    #[error("tool call at byte {0} has no string 'tool' field")]
    MissingTool(usize),

    #[error("tool call at byte {0} has no object 'arguments' field")]
    MissingArguments(usize),
}
