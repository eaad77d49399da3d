//! Response synthesis.
//!
//! The completion service sees the query, the intent, the summary
//! statistics, and only the first few records (`prompt_sample_size`,
//! default 3). When the call fails the answer is a fixed sentence built from
//! the record count and the echoed query alone.

use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::completion::{CompletionClient, CompletionRequest, Message};
use crate::config::{CompletionConfig, RetrievalConfig};
use crate::models::MergedResult;

const SYSTEM_PROMPT: &str = "\
You are an expert oceanographer providing insights on ARGO profile data.
Write a natural-language response that:
1. Directly answers the user's query
2. Summarizes key findings from the data
3. Provides oceanographic context and interpretation
4. Mentions data quality and limitations if relevant
5. Uses scientific terminology and units appropriately

Be concise but informative. Focus on the most relevant insights.";

/// Writes the final answer from merged retrieval results.
pub struct Synthesizer {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
    max_tokens: u32,
    sample_size: usize,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, completion: &CompletionConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            client,
            temperature: completion.response_temperature,
            max_tokens: completion.max_response_tokens,
            sample_size: retrieval.prompt_sample_size,
        }
    }

    /// User-turn content for `merged`.
    pub fn prompt(&self, merged: &MergedResult) -> String {
        let ctx = &merged.query_context;
        let summary = json!({
            "query": ctx.original_query,
            "intent": ctx.intent,
            "total_results": merged.summary.total_profiles,
            "geographic_bounds": merged.summary.geographic_bounds,
            "variable_ranges": merged.summary.variable_ranges,
        });
        let sample: Vec<_> = merged.profiles.iter().take(self.sample_size).collect();

        format!(
            "User Query: \"{}\"\n\nData Summary: {}\n\nSample Profiles: {}\n\n\
             Please provide a comprehensive response to the user's query based on this ARGO data.",
            ctx.original_query,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
            serde_json::to_string_pretty(&sample).unwrap_or_default(),
        )
    }

    /// Answer text for `merged`, with `history` as prior turns.
    ///
    /// # Returns
    ///
    /// The model's reply, or [`fallback_answer`] if the completion request
    /// fails. This never returns an error.
    pub async fn respond(&self, merged: &MergedResult, history: Vec<Message>) -> String {
        let request = CompletionRequest::new(SYSTEM_PROMPT, self.prompt(merged))
            .with_history(history)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.client.complete(&request).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "response synthesis failed, using fallback answer");
                fallback_answer(merged)
            }
        }
    }
}

/// Deterministic answer that only uses the record count and the query.
pub fn fallback_answer(merged: &MergedResult) -> String {
    format!(
        "Found {} ARGO profiles matching your query '{}'. The data includes oceanographic \
         measurements from various locations and time periods. Please check the detailed \
         results for specific values and metadata.",
        merged.summary.total_profiles, merged.query_context.original_query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use crate::models::{Entities, QueryContext, QueryIntent};
    use crate::normalize::{normalize_structured, summarize};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Capture {
        fail: bool,
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionClient for Capture {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            if self.fail {
                Err(CompletionError::Malformed("empty completion".into()))
            } else {
                Ok("Surface temperature averages 27 °C.".into())
            }
        }
    }

    fn merged(n: usize) -> MergedResult {
        let rows: Vec<_> = (0..n)
            .map(|i| json!({"id": format!("p{}", i), "surface_temp": 25.0 + i as f64}))
            .collect();
        let profiles = normalize_structured(&json!({ "rows": rows }));
        MergedResult {
            query_context: QueryContext::new("warm water", QueryIntent::Semantic, 0.8, Entities::default()),
            summary: summarize(&profiles),
            profiles,
        }
    }

    fn synthesizer(client: Arc<Capture>) -> Synthesizer {
        Synthesizer::new(client, &CompletionConfig::default(), &RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_prompt_bounded_to_sample() {
        let client = Arc::new(Capture {
            fail: false,
            seen: Mutex::new(None),
        });
        let answer = synthesizer(client.clone()).respond(&merged(8), vec![]).await;
        assert_eq!(answer, "Surface temperature averages 27 °C.");

        let request = client.seen.lock().unwrap().clone().unwrap();
        assert!(request.user_content.contains("\"total_results\": 8"));
        assert!(request.user_content.contains("\"p2\""));
        assert!(!request.user_content.contains("\"p3\""));
        assert_eq!(request.max_tokens, Some(1000));
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_template() {
        let client = Arc::new(Capture {
            fail: true,
            seen: Mutex::new(None),
        });
        let answer = synthesizer(client).respond(&merged(0), vec![]).await;
        assert!(answer.starts_with("Found 0 ARGO profiles matching your query 'warm water'."));
    }
}
