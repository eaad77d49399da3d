//! Core data models that flow through the query pipeline.
//!
//! All of these live for exactly one query: a [`QueryContext`] is created by
//! the classifier, records are produced by the normalizer, and a
//! [`MergedResult`] is derived from them and handed to the synthesizer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Retrieval strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Exact filtering through the structured-query tool.
    Structured,
    /// Approximate similarity search through the semantic-retrieval tool.
    Semantic,
    /// Both, merged by record id.
    Hybrid,
    /// The model could not decide. Retrieved like [`QueryIntent::Semantic`].
    Unknown,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Structured => "structured",
            QueryIntent::Semantic => "semantic",
            QueryIntent::Hybrid => "hybrid",
            QueryIntent::Unknown => "unknown",
        }
    }

    /// The strategy actually executed for this intent.
    pub fn effective(self) -> QueryIntent {
        match self {
            QueryIntent::Unknown => QueryIntent::Semantic,
            other => other,
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entities pulled out of the raw query text. Empty categories are omitted
/// when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocean_terms: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.dates.is_empty() && self.ocean_terms.is_empty()
    }
}

/// Per-query classification state.
///
/// Fixed after classification except for the two query-text fields, which
/// record what was actually sent to each backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub original_query: String,
    pub intent: QueryIntent,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub extracted_entities: Entities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_query_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_query_text: Option<String>,
}

impl QueryContext {
    pub fn new(query: &str, intent: QueryIntent, confidence: f64, entities: Entities) -> Self {
        Self {
            original_query: query.to_string(),
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            extracted_entities: entities,
            structured_query_text: None,
            semantic_query_text: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureVariables {
    /// Sea surface temperature (°C).
    pub surface: Option<f64>,
    /// Metres.
    pub thermocline_depth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalinityVariables {
    /// Sea surface salinity (PSU).
    pub surface: Option<f64>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileVariables {
    pub temperature: TemperatureVariables,
    pub salinity: SalinityVariables,
    pub stratification: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed_layer_depth: Option<f64>,
}

/// Which backend produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Structured,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source: Provenance,
    pub quality_flag: String,
    pub data_mode: String,
}

/// Canonical profile record. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub float_id: String,
    pub cycle_number: i64,
    pub location: Location,
    pub timestamp: String,
    pub variables: ProfileVariables,
    pub metadata: RecordMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_note: Option<String>,
}

/// Min / max / arithmetic mean over the values that are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// `[min, max]`, `[0, 0]` when empty.
    pub lat_range: [f64; 2],
    pub lon_range: [f64; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableRanges {
    pub temperature: VariableStats,
    pub salinity: VariableStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_profiles: usize,
    pub geographic_bounds: GeoBounds,
    pub variable_ranges: VariableRanges,
}

/// Records and statistics for one query. Recomputed per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub query_context: QueryContext,
    pub summary: ResultSummary,
    pub profiles: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub execution_ms: u64,
    /// RFC 3339.
    pub timestamp: String,
    pub result_count: usize,
    pub session_id: String,
}

/// Everything returned by [`Pipeline::process_query`](crate::pipeline::Pipeline::process_query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub intent: QueryIntent,
    pub confidence: f64,
    pub merged: MergedResult,
    pub answer: String,
    /// Error messages from tool calls that failed without failing the query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub metadata: ResponseMetadata,
}
