//! Structured-query generation.
//!
//! The completion service turns a classified query into SQL over the
//! `argo_profiles` table. Any failure (transport, empty or malformed output)
//! falls back to [`DEFAULT_QUERY`], which returns the ten most recent
//! profiles.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::completion::{strip_code_fence, CompletionClient, CompletionRequest};
use crate::models::QueryContext;

/// Sent when generation fails.
pub const DEFAULT_QUERY: &str = "SELECT * FROM argo_profiles ORDER BY date DESC LIMIT 10";

/// Column listing shared by every prompt that needs to describe the data.
pub const PROFILE_SCHEMA: &str = "\
ARGO Profiles Table Schema (argo_profiles):
- id: string (primary key)
- platform_number: string (float identifier)
- cycle_number: integer
- latitude: float (-90 to 90)
- longitude: float (-180 to 180)
- date: timestamp
- thermocline_depth: float (meters)
- salinity_min_depth: float (meters)
- salinity_max_depth: float (meters)
- mean_stratification: float
- surface_temp: float (Celsius)
- surface_sal: float (PSU)
- quality_flag: string
- data_mode: string";

/// Model-backed SQL writer for the structured branch.
pub struct QueryGenerator {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
}

impl QueryGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }

    fn system_prompt() -> String {
        format!(
            "You are an expert SQL query generator for oceanographic ARGO data.\n\n{}\n\n\
             Generate efficient PostgreSQL queries. Use proper spatial functions for geographic queries. \
             Always include reasonable LIMIT clauses. Return only the SQL query, no explanations.",
            PROFILE_SCHEMA
        )
    }

    fn user_prompt(context: &QueryContext) -> String {
        let entities = serde_json::to_string(&context.extracted_entities).unwrap_or_default();
        format!(
            "Generate SQL for: '{}'\n\nExtracted entities: {}",
            context.original_query, entities
        )
    }

    /// Produce query text for `context`. Never fails.
    pub async fn generate(&self, context: &QueryContext) -> String {
        let request = CompletionRequest::new(Self::system_prompt(), Self::user_prompt(context))
            .with_temperature(self.temperature);

        match self.client.complete(&request).await {
            Ok(reply) => {
                let sql = strip_code_fence(&reply).trim();
                if sql.is_empty() {
                    warn!("query generation returned nothing, using default query");
                    DEFAULT_QUERY.to_string()
                } else {
                    debug!(sql, "generated structured query");
                    sql.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "query generation failed, using default query");
                DEFAULT_QUERY.to_string()
            }
        }
    }
}
