//! Intent classification.
//!
//! Two fixed sets of compiled patterns score a query: one for structured
//! filtering (SQL vocabulary, comparisons on numeric fields, date ranges),
//! one for semantic search (similarity language, qualitative descriptors,
//! regional and seasonal vocabulary). A query's score for a set is the
//! number of patterns in it that match.
//!
//! When the scores differ by more than one the higher side wins with fixed
//! confidence [`PATTERN_CONFIDENCE`]. Otherwise the query is escalated to an
//! [`IntentFallback`] exactly once. The fallback failing in any way yields
//! semantic search at [`FAIL_OPEN_CONFIDENCE`]; classification itself never
//! fails.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use crate::completion::{strip_code_fence, CompletionClient, CompletionRequest};
use crate::entities::extract_entities;
use crate::error::CompletionError;
use crate::models::{QueryContext, QueryIntent};

/// Bumped whenever a pattern is added, removed or edited.
pub const PATTERN_TABLE_VERSION: u32 = 2;

/// Confidence of every pattern-decided verdict.
pub const PATTERN_CONFIDENCE: f64 = 0.8;
/// Confidence reported when the fallback fails and semantic search is used.
pub const FAIL_OPEN_CONFIDENCE: f64 = 0.5;

const STRUCTURED_PATTERNS: &[&str] = &[
    r"\b(select|where|group by|order by|count|sum|avg|max|min)\b",
    r"\b(temperature|salinity|pressure|depth)\s*(>|<|=|>=|<=)\s*\d+",
    r"\b(latitude|longitude)\s*(between|>|<|=)\s*[-\d.]+",
    r#"\bdate\s*(between|>|<|=)\s*['"]\d{4}-\d{2}-\d{2}"#,
    r"\b(profiles?|floats?|cycles?)\s*(with|having|where)",
];

const SEMANTIC_PATTERNS: &[&str] = &[
    r"\b(find|search|show|get|retrieve)\s+.*\b(like|similar|related)",
    r"\b(warm|cold|hot|cool)\s+(water|ocean|sea)",
    r"\b(high|low|deep|shallow)\s+(salinity|temperature|pressure)",
    r"\b(tropical|arctic|polar|equatorial|subtropical)",
    r"\b(upwelling|downwelling|current|gyre|front)",
    r"\b(seasonal|winter|summer|spring|fall|autumn)",
    r"\b(arabian sea|bay of bengal|mediterranean|caribbean|red sea|south china sea|gulf of mexico|sargasso|coral sea|southern ocean)\b",
];

/// Compiled, versioned pattern rules.
pub struct PatternTable {
    pub version: u32,
    structured: Vec<Regex>,
    semantic: Vec<Regex>,
}

impl PatternTable {
    fn compile(patterns: &[&str]) -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("Invalid regex"))
            .collect()
    }

    /// Count matching rules per family. Each rule counts at most once.
    pub fn score(&self, text: &str) -> PatternScores {
        PatternScores {
            structured: self.structured.iter().filter(|re| re.is_match(text)).count(),
            semantic: self.semantic.iter().filter(|re| re.is_match(text)).count(),
        }
    }

    /// Rule counts as `(structured, semantic)`.
    pub fn len(&self) -> (usize, usize) {
        (self.structured.len(), self.semantic.len())
    }
}

static PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| PatternTable {
    version: PATTERN_TABLE_VERSION,
    structured: PatternTable::compile(STRUCTURED_PATTERNS),
    semantic: PatternTable::compile(SEMANTIC_PATTERNS),
});

/// The process-wide compiled table.
pub fn pattern_table() -> &'static PatternTable {
    &PATTERNS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternScores {
    pub structured: usize,
    pub semantic: usize,
}

impl PatternScores {
    /// Deterministic verdict, or `None` when the scores are within one of
    /// each other and the fallback must decide.
    pub fn decide(&self) -> Option<(QueryIntent, f64)> {
        if self.structured.abs_diff(self.semantic) <= 1 {
            None
        } else if self.structured > self.semantic {
            Some((QueryIntent::Structured, PATTERN_CONFIDENCE))
        } else {
            Some((QueryIntent::Semantic, PATTERN_CONFIDENCE))
        }
    }
}

/// Convenience for `pattern_table().score(text)`.
pub fn score(text: &str) -> PatternScores {
    PATTERNS.score(text)
}

/// Classifies queries the pattern table cannot settle.
#[async_trait]
pub trait IntentFallback: Send + Sync {
    async fn classify(&self, text: &str) -> Result<(QueryIntent, f64), CompletionError>;
}

const CLASSIFY_PROMPT: &str = r#"You are an expert in oceanographic data queries over ARGO float profiles.
Classify the user's query as one of:
- "sql": needs structured database filtering with specific conditions
- "semantic": needs natural-language understanding and similarity search
- "hybrid": needs both

Respond with JSON only: {"intent": "sql|semantic|hybrid", "confidence": 0.0-1.0}"#;

/// Model-backed fallback using the completion service.
pub struct LlmIntentFallback {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
}

impl LlmIntentFallback {
    /// `temperature` is `[completion].classify_temperature`.
    pub fn new(client: Arc<dyn CompletionClient>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }
}

#[async_trait]
impl IntentFallback for LlmIntentFallback {
    async fn classify(&self, text: &str) -> Result<(QueryIntent, f64), CompletionError> {
        let request = CompletionRequest::new(
            CLASSIFY_PROMPT,
            format!("Classify this oceanographic query: '{}'", text),
        )
        .with_temperature(self.temperature);

        let reply = self.client.complete(&request).await?;
        parse_verdict(&reply)
    }
}

/// Parse `{"intent": ..., "confidence": ...}`.
///
/// Labels other than sql/structured, semantic and hybrid map to
/// [`QueryIntent::Unknown`]; a missing confidence is 0.5.
pub fn parse_verdict(reply: &str) -> Result<(QueryIntent, f64), CompletionError> {
    let json: serde_json::Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| CompletionError::Malformed(format!("intent verdict: {}", e)))?;
    if !json.is_object() {
        return Err(CompletionError::Malformed(
            "intent verdict is not a JSON object".into(),
        ));
    }

    let intent = match json.get("intent").and_then(|v| v.as_str()) {
        Some("sql") | Some("structured") => QueryIntent::Structured,
        Some("semantic") => QueryIntent::Semantic,
        Some("hybrid") => QueryIntent::Hybrid,
        _ => QueryIntent::Unknown,
    };
    let confidence = json
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(FAIL_OPEN_CONFIDENCE)
        .clamp(0.0, 1.0);

    Ok((intent, confidence))
}

/// Decides the retrieval strategy for a query.
///
/// The pattern table settles clear cases locally. Near ties go to an
/// [`IntentFallback`], which is consulted at most once per query.
pub struct IntentClassifier {
    fallback: Arc<dyn IntentFallback>,
}

impl IntentClassifier {
    pub fn new(fallback: Arc<dyn IntentFallback>) -> Self {
        Self { fallback }
    }

    /// Classify `text` and extract its entities.
    ///
    /// # Arguments
    ///
    /// * `text` - The raw user query.
    ///
    /// # Returns
    ///
    /// A [`QueryContext`] with intent, confidence and entities set and both
    /// query-text fields empty. When one family leads by more than one
    /// match, that family wins with [`PATTERN_CONFIDENCE`]. Otherwise the
    /// fallback's verdict is used. If the fallback fails, the result is
    /// semantic at [`FAIL_OPEN_CONFIDENCE`]. This never returns an error.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use async_trait::async_trait;
    /// # use argo_rag::classifier::{IntentClassifier, IntentFallback};
    /// # use argo_rag::error::CompletionError;
    /// # use argo_rag::models::QueryIntent;
    /// # struct Unused;
    /// # #[async_trait]
    /// # impl IntentFallback for Unused {
    /// #     async fn classify(&self, _: &str) -> Result<(QueryIntent, f64), CompletionError> {
    /// #         unreachable!()
    /// #     }
    /// # }
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let classifier = IntentClassifier::new(Arc::new(Unused));
    /// let ctx = classifier.classify("Count all profiles with temperature > 25").await;
    /// assert_eq!(ctx.intent, QueryIntent::Structured);
    /// assert_eq!(ctx.confidence, 0.8);
    /// # });
    /// ```
    pub async fn classify(&self, text: &str) -> QueryContext {
        let scores = score(text);
        let entities = extract_entities(text);

        let (intent, confidence) = match scores.decide() {
            Some(verdict) => verdict,
            None => match self.fallback.classify(text).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(error = %e, "intent fallback failed, defaulting to semantic");
                    (QueryIntent::Semantic, FAIL_OPEN_CONFIDENCE)
                }
            },
        };

        info!(
            intent = %intent,
            confidence,
            structured_score = scores.structured,
            semantic_score = scores.semantic,
            "classified query"
        );
        QueryContext::new(text, intent, confidence, entities)
    }
}
