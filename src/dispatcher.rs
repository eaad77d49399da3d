//! Retrieval strategy execution.
//!
//! | Intent | Tool calls |
//! |--------|------------|
//! | structured | generated SQL → `queryARGO` |
//! | semantic, unknown | raw query → `retrieveARGO` |
//! | hybrid | both, then [`merge`] |
//!
//! Each branch records the text it sent on the [`QueryContext`]. A failed
//! branch contributes no records and one warning; in hybrid mode the other
//! branch still counts.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{MergeOverlay, RetrievalConfig};
use crate::models::{NormalizedRecord, QueryContext, QueryIntent};
use crate::normalize::{merge, normalize_payload};
use crate::protocol::{ToolCall, ToolKind, ToolResult};
use crate::query_gen::QueryGenerator;
use crate::tools::ToolDispatcher;

/// Records gathered for one query plus the error messages of failed branches.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<String>,
}

type BranchOutcome = Result<Vec<NormalizedRecord>, String>;

/// Runs the tool calls an intent calls for and turns their payloads into
/// canonical records.
pub struct RetrievalDispatcher {
    tools: Arc<ToolDispatcher>,
    generator: QueryGenerator,
    overlay: MergeOverlay,
    concurrent_hybrid: bool,
}

impl RetrievalDispatcher {
    /// `retrieval` supplies the merge overlay mode and whether hybrid
    /// branches run concurrently.
    pub fn new(tools: Arc<ToolDispatcher>, generator: QueryGenerator, retrieval: &RetrievalConfig) -> Self {
        Self {
            tools,
            generator,
            overlay: retrieval.merge_overlay,
            concurrent_hybrid: retrieval.concurrent_hybrid,
        }
    }

    /// Execute the strategy for `context.intent`.
    ///
    /// # Arguments
    ///
    /// * `context` - Classified query. `structured_query_text` and
    ///   `semantic_query_text` are filled in with what each branch sent.
    ///
    /// # Returns
    ///
    /// The records and a warning per failed branch. Hybrid results are
    /// merged by profile id with structured records first. Failures never
    /// propagate; a query whose every branch failed returns no records.
    pub async fn retrieve(&self, context: &mut QueryContext) -> Retrieval {
        let mut out = Retrieval::default();

        match context.intent.effective() {
            QueryIntent::Structured => {
                let (sql, outcome) = self.structured_branch(context).await;
                context.structured_query_text = Some(sql);
                out.records = absorb(&mut out.warnings, outcome);
            }
            QueryIntent::Hybrid => {
                let query = context.original_query.clone();
                let ((sql, structured), semantic) = if self.concurrent_hybrid {
                    tokio::join!(self.structured_branch(context), self.semantic_branch(&query))
                } else {
                    let structured = self.structured_branch(context).await;
                    (structured, self.semantic_branch(&query).await)
                };
                context.structured_query_text = Some(sql);
                context.semantic_query_text = Some(query);

                let structured = absorb(&mut out.warnings, structured);
                let semantic = absorb(&mut out.warnings, semantic);
                out.records = merge(structured, semantic, self.overlay);
            }
            _ => {
                let query = context.original_query.clone();
                let outcome = self.semantic_branch(&query).await;
                context.semantic_query_text = Some(query);
                out.records = absorb(&mut out.warnings, outcome);
            }
        }

        info!(
            intent = %context.intent,
            records = out.records.len(),
            warnings = out.warnings.len(),
            "retrieval finished"
        );
        out
    }

    async fn structured_branch(&self, context: &QueryContext) -> (String, BranchOutcome) {
        let sql = self.generator.generate(context).await;
        let call = ToolCall::new(
            ToolKind::StructuredQuery.name(),
            json!({ "sql": sql }),
            "structured",
        );
        let outcome = into_records(ToolKind::StructuredQuery, self.tools.dispatch(&call).await);
        (sql, outcome)
    }

    async fn semantic_branch(&self, query: &str) -> BranchOutcome {
        let call = ToolCall::new(
            ToolKind::SemanticRetrieval.name(),
            json!({ "query": query }),
            "semantic",
        );
        into_records(ToolKind::SemanticRetrieval, self.tools.dispatch(&call).await)
    }
}

fn into_records(kind: ToolKind, result: ToolResult) -> BranchOutcome {
    match result.payload() {
        Some(data) => Ok(normalize_payload(kind, data)),
        None => Err(format!(
            "{}: {}",
            result.call_id,
            result.error.as_deref().unwrap_or("tool call failed")
        )),
    }
}

/// Records of a successful branch; a failed branch becomes a warning.
fn absorb(warnings: &mut Vec<String>, outcome: BranchOutcome) -> Vec<NormalizedRecord> {
    match outcome {
        Ok(records) => records,
        Err(message) => {
            warn!(error = %message, "retrieval branch failed");
            warnings.push(message);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RetrievalBackend;
    use crate::completion::{CompletionClient, CompletionRequest};
    use crate::error::{BackendError, CompletionError};
    use crate::models::Entities;
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedSql;

    #[async_trait]
    impl CompletionClient for FixedSql {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            Ok("SELECT * FROM argo_profiles WHERE surface_temp > 25 LIMIT 50".into())
        }
    }

    /// Answers per tool name; `fail` lists tools that always fail.
    struct TableBackend {
        fail: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RetrievalBackend for TableBackend {
        async fn call(&self, tool: &str, _arguments: &Value) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push(tool.to_string());
            if self.fail.iter().any(|f| *f == tool) {
                return Err(BackendError::Status {
                    status: 400,
                    body: "rejected".into(),
                });
            }
            Ok(match tool {
                "queryARGO" => json!({"success": true, "data": {"rows": [
                    {"id": "p1", "surface_temp": 28.5},
                    {"id": "p2", "surface_temp": 26.0}
                ]}}),
                _ => json!({"success": true, "data": {
                    "profiles": [{"id": "p2"}, {"id": "p3"}],
                    "similarities": [0.9, 0.7]
                }}),
            })
        }
    }

    fn dispatcher(fail: Vec<&'static str>) -> (RetrievalDispatcher, Arc<TableBackend>) {
        let backend = Arc::new(TableBackend {
            fail,
            calls: Mutex::new(Vec::new()),
        });
        let config = RetrievalConfig::default();
        let tools = Arc::new(ToolDispatcher::new(
            backend.clone(),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                timeout: Duration::from_secs(5),
            },
            (&config).into(),
        ));
        let generator = QueryGenerator::new(Arc::new(FixedSql), 0.1);
        (RetrievalDispatcher::new(tools, generator, &config), backend)
    }

    fn ctx(intent: QueryIntent) -> QueryContext {
        QueryContext::new("warm profiles", intent, 0.8, Entities::default())
    }

    #[tokio::test]
    async fn test_structured_records_query_text() {
        let (d, backend) = dispatcher(vec![]);
        let mut context = ctx(QueryIntent::Structured);
        let out = d.retrieve(&mut context).await;

        assert_eq!(out.records.len(), 2);
        assert!(context
            .structured_query_text
            .as_deref()
            .unwrap()
            .contains("surface_temp > 25"));
        assert!(context.semantic_query_text.is_none());
        assert_eq!(*backend.calls.lock().unwrap(), vec!["queryARGO"]);
    }

    #[tokio::test]
    async fn test_unknown_behaves_as_semantic() {
        let (d, backend) = dispatcher(vec![]);
        let mut context = ctx(QueryIntent::Unknown);
        let out = d.retrieve(&mut context).await;

        assert_eq!(out.records.len(), 2);
        assert_eq!(context.semantic_query_text.as_deref(), Some("warm profiles"));
        assert_eq!(*backend.calls.lock().unwrap(), vec!["retrieveARGO"]);
    }

    #[tokio::test]
    async fn test_hybrid_merges_by_id() {
        let (d, _) = dispatcher(vec![]);
        let mut context = ctx(QueryIntent::Hybrid);
        let out = d.retrieve(&mut context).await;

        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert_eq!(out.records[1].variables.temperature.surface, Some(26.0));
        assert_eq!(out.records[1].similarity_score, Some(0.9));
        assert!(context.structured_query_text.is_some());
        assert!(context.semantic_query_text.is_some());
        assert!(out.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_partial_failure_keeps_other_branch() {
        let (d, _) = dispatcher(vec!["queryARGO"]);
        let mut context = ctx(QueryIntent::Hybrid);
        let out = d.retrieve(&mut context).await;

        let ids: Vec<&str> = out.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("structured:"));
    }
}
