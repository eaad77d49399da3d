//! Tool-call protocol.
//!
//! A model asks for a tool by writing the marker `TOOL_CALL:` followed by a
//! single JSON object:
//!
//! ```text
//! TOOL_CALL: {"tool": "retrieveARGO", "arguments": {"query": "warm pool"}, "call_id": "c1"}
//! ```
//!
//! `tool` (string) and `arguments` (object) are required. `call_id` is
//! optional; when absent the call gets `call_<n>`, where `n` is the
//! zero-based position of the call among the successfully parsed calls in
//! the text.
//!
//! [`scan_tool_calls`] reports one entry per marker occurrence (a call or a
//! [`ToolCallParseError`]); [`extract_tool_calls`] logs and drops the
//! failures. Tool names are not checked here: an unknown name parses fine
//! and is rejected at dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ToolCallParseError;

/// Literal prefix of every tool call in model output.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub call_id: String,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Value, call_id: impl Into<String>) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            arguments,
            call_id: call_id.into(),
        }
    }

    /// Render in wire format, as a model would write it.
    pub fn to_marker(&self) -> String {
        let body = serde_json::json!({
            "tool": self.tool_name,
            "arguments": self.arguments,
            "call_id": self.call_id,
        });
        format!("{} {}", TOOL_CALL_MARKER, body)
    }
}

/// Outcome of one tool call. Exactly one of `data` / `error` is meaningful,
/// selected by `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, data: Value, metadata: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn failed(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    /// Payload of a successful result, `None` for failures.
    pub fn payload(&self) -> Option<&Value> {
        if self.success {
            self.data.as_ref()
        } else {
            None
        }
    }
}

/// The four tools exposed by the ARGO tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    StructuredQuery,
    SemanticRetrieval,
    LocationSearch,
    DateRangeSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::StructuredQuery,
        ToolKind::SemanticRetrieval,
        ToolKind::LocationSearch,
        ToolKind::DateRangeSearch,
    ];

    /// Wire name of the tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::StructuredQuery => "queryARGO",
            ToolKind::SemanticRetrieval => "retrieveARGO",
            ToolKind::LocationSearch => "getARGOByLocation",
            ToolKind::DateRangeSearch => "getARGOByDateRange",
        }
    }

    /// Exact, case-sensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::StructuredQuery => {
                "Execute a SQL query on the argo_profiles table. Use for filtering by specific criteria, statistics and aggregations."
            }
            ToolKind::SemanticRetrieval => {
                "Semantic vector search over profile summaries using natural language. Use for conceptual queries and similar oceanographic conditions."
            }
            ToolKind::LocationSearch => "Find profiles near geographic coordinates.",
            ToolKind::DateRangeSearch => "Retrieve profiles within a date range (YYYY-MM-DD).",
        }
    }

    pub fn required_arguments(&self) -> &'static [&'static str] {
        match self {
            ToolKind::StructuredQuery => &["sql"],
            ToolKind::SemanticRetrieval => &["query"],
            ToolKind::LocationSearch => &["latitude", "longitude"],
            ToolKind::DateRangeSearch => &["startDate", "endDate"],
        }
    }

    /// OpenAI function-calling JSON Schema for the tool's arguments.
    pub fn parameters_schema(&self) -> Value {
        let (properties, required) = match self {
            ToolKind::StructuredQuery => (
                serde_json::json!({
                    "sql": { "type": "string", "description": "SQL query text" },
                    "page": { "type": "integer", "description": "1-based page number", "default": 1 },
                    "pageSize": { "type": "integer", "description": "Rows per page" }
                }),
                self.required_arguments(),
            ),
            ToolKind::SemanticRetrieval => (
                serde_json::json!({
                    "query": { "type": "string", "description": "Natural-language description" },
                    "limit": { "type": "integer", "description": "Maximum profiles" }
                }),
                self.required_arguments(),
            ),
            ToolKind::LocationSearch => (
                serde_json::json!({
                    "latitude": { "type": "number", "description": "Decimal degrees, -90 to 90" },
                    "longitude": { "type": "number", "description": "Decimal degrees, -180 to 180" },
                    "radius": { "type": "number", "description": "Search radius (km)" }
                }),
                self.required_arguments(),
            ),
            ToolKind::DateRangeSearch => (
                serde_json::json!({
                    "startDate": { "type": "string", "description": "YYYY-MM-DD" },
                    "endDate": { "type": "string", "description": "YYYY-MM-DD" },
                    "page": { "type": "integer", "default": 1 },
                    "pageSize": { "type": "integer" }
                }),
                self.required_arguments(),
            ),
        };
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// True when `text` contains at least one marker.
pub fn contains_tool_calls(text: &str) -> bool {
    text.contains(TOOL_CALL_MARKER)
}

/// Parse every marker occurrence in order of appearance.
///
/// A marker that falls inside the JSON of a previously parsed call (for
/// example inside a string argument) is part of that call, not a new one.
pub fn scan_tool_calls(text: &str) -> Vec<Result<ToolCall, ToolCallParseError>> {
    let mut out = Vec::new();
    let mut parsed = 0usize;
    let mut consumed_until = 0usize;

    for (offset, _) in text.match_indices(TOOL_CALL_MARKER) {
        if offset < consumed_until {
            continue;
        }
        let body_start = offset + TOOL_CALL_MARKER.len();
        let rest = &text[body_start..];

        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                out.push(Err(ToolCallParseError::InvalidJson {
                    offset,
                    message: e.to_string(),
                }));
                continue;
            }
            None => {
                out.push(Err(ToolCallParseError::InvalidJson {
                    offset,
                    message: "no JSON object after marker".to_string(),
                }));
                continue;
            }
        };
        consumed_until = body_start + stream.byte_offset();

        match call_from_value(value, offset, parsed) {
            Ok(call) => {
                parsed += 1;
                out.push(Ok(call));
            }
            Err(e) => out.push(Err(e)),
        }
    }

    out
}

/// Parse every well-formed call; malformed occurrences are logged and skipped.
pub fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    scan_tool_calls(text)
        .into_iter()
        .filter_map(|r| match r {
            Ok(call) => Some(call),
            Err(e) => {
                warn!(error = %e, "skipping malformed tool call");
                None
            }
        })
        .collect()
}

fn call_from_value(
    value: Value,
    offset: usize,
    index: usize,
) -> Result<ToolCall, ToolCallParseError> {
    let Value::Object(mut obj) = value else {
        return Err(ToolCallParseError::NotAnObject(offset));
    };

    let tool_name = match obj.remove("tool") {
        Some(Value::String(name)) => name,
        _ => return Err(ToolCallParseError::MissingTool(offset)),
    };
    let arguments = match obj.remove("arguments") {
        Some(Value::Object(args)) => args,
        _ => return Err(ToolCallParseError::MissingArguments(offset)),
    };
    let call_id = match obj.remove("call_id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => format!("call_{}", index),
    };

    Ok(ToolCall {
        tool_name,
        arguments,
        call_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_call_with_explicit_id() {
        let text = r#"Let me look. TOOL_CALL: {"tool": "retrieveARGO", "arguments": {"query": "monsoon mixed layer"}, "call_id": "abc"}"#;
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "retrieveARGO");
        assert_eq!(calls[0].call_id, "abc");
        assert_eq!(calls[0].arguments["query"], "monsoon mixed layer");
    }

    #[test]
    fn test_nested_arguments_parse() {
        let text = r#"TOOL_CALL: {"tool": "queryARGO", "arguments": {"sql": "SELECT 1", "filters": {"region": {"lat": [0, 10]}}}}"#;
        let calls = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["filters"]["region"]["lat"][1], 10);
    }

    #[test]
    fn test_malformed_skipped_and_ids_positional() {
        let text = concat!(
            r#"TOOL_CALL: {"tool": "queryARGO", "arguments": {"sql": "SELECT 1"}}"#,
            "\nthen TOOL_CALL: {\"tool\": \"retrieveARGO\", \"arguments\": {\"query\": \n",
            "\nand TOOL_CALL: not json at all\n",
            r#"TOOL_CALL: {"tool": "getARGOByDateRange", "arguments": {"startDate": "2023-01-01", "endDate": "2023-12-31"}}"#,
        );

        let scanned = scan_tool_calls(text);
        assert_eq!(scanned.len(), 4);
        assert_eq!(scanned.iter().filter(|r| r.is_err()).count(), 2);

        let calls = extract_tool_calls(text);
        let ids: Vec<&str> = calls.iter().map(|c| c.call_id.as_str()).collect();
        let names: Vec<&str> = calls.iter().map(|c| c.tool_name.as_str()).collect();
        assert_eq!(ids, vec!["call_0", "call_1"]);
        assert_eq!(names, vec!["queryARGO", "getARGOByDateRange"]);
    }

    #[test]
    fn test_missing_required_keys() {
        let scanned = scan_tool_calls(
            r#"TOOL_CALL: {"arguments": {}} TOOL_CALL: {"tool": "x"} TOOL_CALL: [1, 2]"#,
        );
        assert!(matches!(scanned[0], Err(ToolCallParseError::MissingTool(_))));
        assert!(matches!(
            scanned[1],
            Err(ToolCallParseError::MissingArguments(_))
        ));
        assert!(matches!(scanned[2], Err(ToolCallParseError::NotAnObject(_))));
    }

    #[test]
    fn test_marker_inside_argument_is_not_a_call() {
        let text = r#"TOOL_CALL: {"tool": "retrieveARGO", "arguments": {"query": "TOOL_CALL: {}"}}"#;
        let scanned = scan_tool_calls(text);
        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].is_ok());
    }

    #[test]
    fn test_unknown_tool_still_parses() {
        let calls = extract_tool_calls(r#"TOOL_CALL: {"tool": "dropTables", "arguments": {}}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "dropTables");
    }

    #[test]
    fn test_marker_rendering_parses_back() {
        let call = ToolCall::new(
            "getARGOByLocation",
            serde_json::json!({"latitude": -5.2, "longitude": 67.8}),
            "loc-1",
        );
        let parsed = extract_tool_calls(&call.to_marker());
        assert_eq!(parsed, vec![call]);
    }

    #[test]
    fn test_tool_kind_names() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            let schema = kind.parameters_schema();
            assert_eq!(schema["type"], "object");
            assert_eq!(
                schema["required"].as_array().unwrap().len(),
                kind.required_arguments().len()
            );
        }
        assert_eq!(ToolKind::from_name("queryargo"), None);
    }

    #[test]
    fn test_tool_result_payload() {
        let ok = ToolResult::ok("c", serde_json::json!({"rows": []}), Map::new());
        assert!(ok.payload().is_some());
        let failed = ToolResult::failed("c", "boom");
        assert!(failed.payload().is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
