//! Tool dispatch.
//!
//! [`ToolDispatcher`] turns a [`ToolCall`] into a [`ToolResult`]:
//!
//! 1. Resolve the tool name ([`ToolKind::from_name`]). Unknown names fail
//!    with `Unknown tool: <name>`.
//! 2. Validate arguments against the tool's parameter schema: required
//!    arguments must be present and non-null, known arguments must have the
//!    declared JSON type.
//! 3. Fill optional arguments from configuration (`page`, `pageSize`,
//!    `limit`, `radius`).
//! 4. Invoke the [`RetrievalBackend`] under the backend retry policy.
//! 5. Unwrap the response envelope.
//!
//! Every failure along the way ends up as `ToolResult { success: false }`;
//! nothing is raised to the caller. Validation failures never reach the
//! backend and are never retried.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::RetrievalBackend;
use crate::config::{BackendConfig, RetrievalConfig};
use crate::error::ToolCallError;
use crate::protocol::{ToolCall, ToolKind, ToolResult};
use crate::retry::{with_retry, RetryPolicy};

/// Tool description as served by `GET /tools/list` and `argo tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// OpenAI function-calling JSON Schema.
    pub parameters: Value,
}

/// Name, description and schema of every tool, in [`ToolKind::ALL`] order.
pub fn tool_infos() -> Vec<ToolInfo> {
    ToolKind::ALL
        .iter()
        .map(|kind| ToolInfo {
            name: kind.name().to_string(),
            description: kind.description().to_string(),
            parameters: kind.parameters_schema(),
        })
        .collect()
}

/// Values for optional arguments the caller left out.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefaults {
    pub page_size: u32,
    pub semantic_limit: u32,
    pub location_radius: f64,
}

impl From<&RetrievalConfig> for ToolDefaults {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            page_size: config.page_size,
            semantic_limit: config.semantic_limit,
            location_radius: config.location_radius,
        }
    }
}

/// Validating, retrying front end to a [`RetrievalBackend`].
///
/// Every tool call, whether it comes from the pipeline, the agent, the
/// HTTP API or the CLI, goes through [`dispatch`](ToolDispatcher::dispatch).
/// Unknown tools and invalid arguments are rejected before the backend is
/// contacted, and only the backend call itself is retried.
pub struct ToolDispatcher {
    backend: Arc<dyn RetrievalBackend>,
    retry: RetryPolicy,
    defaults: ToolDefaults,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn RetrievalBackend>, retry: RetryPolicy, defaults: ToolDefaults) -> Self {
        Self {
            backend,
            retry,
            defaults,
        }
    }

    /// Retry policy from `[backend]`, argument defaults from `[retrieval]`.
    pub fn from_config(
        backend: Arc<dyn RetrievalBackend>,
        backend_config: &BackendConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self::new(backend, backend_config.retry_policy(), retrieval.into())
    }

    /// Resolve and validate a call, returning the arguments that will be
    /// sent (defaults applied).
    ///
    /// # Errors
    ///
    /// [`ToolCallError::UnknownTool`] for a name outside the four tools,
    /// otherwise the first failure reported by [`validate_arguments`].
    pub fn prepare(&self, call: &ToolCall) -> Result<(ToolKind, Map<String, Value>), ToolCallError> {
        let kind = ToolKind::from_name(&call.tool_name)
            .ok_or_else(|| ToolCallError::UnknownTool(call.tool_name.clone()))?;
        validate_arguments(kind, &call.arguments)?;
        Ok((kind, self.with_defaults(kind, call.arguments.clone())))
    }

    fn with_defaults(&self, kind: ToolKind, mut args: Map<String, Value>) -> Map<String, Value> {
        let mut fill = |key: &str, value: Value| {
            match args.get(key) {
                Some(v) if !v.is_null() => {}
                _ => {
                    args.insert(key.to_string(), value);
                }
            }
        };
        match kind {
            ToolKind::StructuredQuery | ToolKind::DateRangeSearch => {
                fill("page", Value::from(1));
                fill("pageSize", Value::from(self.defaults.page_size));
            }
            ToolKind::SemanticRetrieval => {
                fill("limit", Value::from(self.defaults.semantic_limit));
            }
            ToolKind::LocationSearch => {
                fill("radius", Value::from(self.defaults.location_radius));
            }
        }
        args
    }

    /// Execute one tool call.
    ///
    /// # Returns
    ///
    /// A [`ToolResult`] carrying `call.call_id`. Rejection, exhausted
    /// retries and a `success: false` envelope all come back as a failed
    /// result rather than an error.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use serde_json::json;
    /// # use argo_rag::{backend::HttpBackend, config::Config, protocol::ToolCall, tools::ToolDispatcher};
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = Config::default();
    /// let backend = Arc::new(HttpBackend::new(&config.backend)?);
    /// let tools = ToolDispatcher::from_config(backend, &config.backend, &config.retrieval);
    ///
    /// let call = ToolCall::new("retrieveARGO", json!({"query": "monsoon"}), "call_0");
    /// let result = tools.dispatch(&call).await;
    /// if let Some(data) = result.payload() {
    ///     println!("{}", data);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let (kind, arguments) = match self.prepare(call) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(tool = %call.tool_name, call_id = %call.call_id, error = %e, "rejected tool call");
                return ToolResult::failed(&call.call_id, e.to_string());
            }
        };

        debug!(tool = kind.name(), call_id = %call.call_id, "dispatching tool call");
        let arguments = Value::Object(arguments);
        let outcome = with_retry(&self.retry, kind.name(), |_| {
            self.backend.call(kind.name(), &arguments)
        })
        .await;

        match outcome {
            Ok(envelope) => result_from_envelope(&call.call_id, envelope),
            Err(e) => {
                warn!(tool = kind.name(), call_id = %call.call_id, error = %e, "tool call failed");
                ToolResult::failed(&call.call_id, e.to_string())
            }
        }
    }

    /// Dispatch calls one after another, in order. One result per call.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch(call).await);
        }
        results
    }
}

/// Check required arguments and declared types.
pub fn validate_arguments(kind: ToolKind, args: &Map<String, Value>) -> Result<(), ToolCallError> {
    for required in kind.required_arguments() {
        match args.get(*required) {
            Some(v) if !v.is_null() => {}
            _ => {
                return Err(ToolCallError::MissingArgument {
                    tool: kind.name().to_string(),
                    argument: required.to_string(),
                })
            }
        }
    }

    let schema = kind.parameters_schema();
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (name, prop) in properties {
        let Some(value) = args.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let Some(expected) = prop.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        let type_ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            _ => true,
        };
        if !type_ok {
            return Err(ToolCallError::InvalidArgument {
                tool: kind.name().to_string(),
                argument: name.clone(),
                expected: expected.to_string(),
                actual: json_type_name(value).to_string(),
            });
        }
    }
    Ok(())
}

/// Build an arguments object from `key=value` text pairs.
///
/// Each value is converted to the JSON type the tool's schema declares for
/// its key, so `query=2023` stays the string `"2023"` for `retrieveARGO`
/// while `latitude=15` becomes the number `15.0` for `getARGOByLocation`.
///
/// # Arguments
///
/// * `tool_name` — wire name of the tool; may be unknown.
/// * `pairs` — raw `(key, value)` text, e.g. from repeated `--arg k=v`.
///
/// # Returns
///
/// The arguments map. A value that does not parse as its declared type is
/// kept as a string so that [`validate_arguments`] reports it. Keys the
/// schema does not declare, and all keys of an unknown tool, are parsed as
/// JSON when possible and kept as strings otherwise.
pub fn coerce_arguments(
    tool_name: &str,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Map<String, Value> {
    let schema = ToolKind::from_name(tool_name).map(|kind| kind.parameters_schema());

    pairs
        .into_iter()
        .map(|(key, raw)| {
            let declared = schema
                .as_ref()
                .and_then(|s| s["properties"][key.as_str()]["type"].as_str());
            let value = coerce_value(declared, raw);
            (key, value)
        })
        .collect()
}

fn coerce_value(declared: Option<&str>, raw: String) -> Value {
    match declared {
        Some("string") => Value::String(raw),
        Some("integer") => match raw.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(raw),
        },
        Some("number") => match raw.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            Some(n) => Value::Number(n),
            None => Value::String(raw),
        },
        Some("boolean") => match raw.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw),
        },
        _ => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}

/// Unwrap `{success, data, error, metadata}`. A missing `success` counts as
/// success; a non-object response is taken as bare data.
pub fn result_from_envelope(call_id: &str, envelope: Value) -> ToolResult {
    let Value::Object(mut obj) = envelope else {
        return ToolResult::ok(call_id, envelope, Map::new());
    };

    let success = obj.get("success").and_then(|s| s.as_bool()).unwrap_or(true);
    if !success {
        let error = obj
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("tool call failed")
            .to_string();
        return ToolResult::failed(call_id, error);
    }

    let metadata = match obj.remove("metadata") {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };
    let data = obj.remove("data").unwrap_or(Value::Null);
    ToolResult::ok(call_id, data, metadata)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
