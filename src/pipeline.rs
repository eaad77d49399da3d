//! Top-level query processing.
//!
//! ```text
//! text ─► IntentClassifier ─► RetrievalDispatcher ─► merge/summarize ─► Synthesizer ─► QueryResponse
//! ```
//!
//! [`Pipeline::process_query`] is the outermost boundary: it always returns
//! a [`QueryResponse`]. Anything that goes wrong inside becomes an apology
//! answer and an `error!` log line.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::backend::{HttpBackend, RetrievalBackend};
use crate::classifier::{IntentClassifier, IntentFallback, LlmIntentFallback};
use crate::completion::{CompletionClient, OpenAiCompletion};
use crate::config::Config;
use crate::dispatcher::RetrievalDispatcher;
use crate::entities::extract_entities;
use crate::models::{MergedResult, QueryContext, QueryIntent, QueryResponse, ResponseMetadata};
use crate::normalize::summarize;
use crate::query_gen::QueryGenerator;
use crate::session::Session;
use crate::synth::Synthesizer;
use crate::tools::ToolDispatcher;

/// Answer for an empty query or an internal failure.
pub const APOLOGY_ANSWER: &str = "Sorry, something went wrong while processing your query. \
Please try again, or rephrase your question about ARGO float data.";

/// Classifier, retrieval dispatcher and synthesizer wired to one completion
/// client and one tool backend.
///
/// A `Pipeline` is shared behind an `Arc` by the HTTP server and the CLI.
/// It holds no per-conversation state; callers pass a [`Session`] to each
/// [`process_query`](Pipeline::process_query) call.
pub struct Pipeline {
    config: Arc<Config>,
    classifier: IntentClassifier,
    dispatcher: RetrievalDispatcher,
    synthesizer: Synthesizer,
    tools: Arc<ToolDispatcher>,
}

impl Pipeline {
    /// Assemble a pipeline from its two external services.
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration. Temperatures, tool defaults, retry
    ///   policy and history depth are read from it.
    /// * `completion` - Chat completion client shared by the intent
    ///   fallback, the query generator and the synthesizer.
    /// * `backend` - Tool server transport used for every tool call.
    pub fn new(
        config: Arc<Config>,
        completion: Arc<dyn CompletionClient>,
        backend: Arc<dyn RetrievalBackend>,
    ) -> Self {
        let fallback = Arc::new(LlmIntentFallback::new(
            completion.clone(),
            config.completion.classify_temperature,
        ));
        let tools = Arc::new(ToolDispatcher::from_config(
            backend,
            &config.backend,
            &config.retrieval,
        ));
        let generator = QueryGenerator::new(completion.clone(), config.completion.query_temperature);

        Self {
            classifier: IntentClassifier::new(fallback),
            dispatcher: RetrievalDispatcher::new(tools.clone(), generator, &config.retrieval),
            synthesizer: Synthesizer::new(completion.clone(), &config.completion, &config.retrieval),
            tools,
            config,
        }
    }

    /// Build the pipeline with the OpenAI-compatible completion client and
    /// the HTTP tool server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable named by
    /// `[completion].api_key_env` is unset, or if either HTTP client cannot
    /// be constructed.
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let completion = Arc::new(OpenAiCompletion::new(&config.completion)?);
        let backend = HttpBackend::new(&config.backend)?;
        info!(endpoint = backend.endpoint(), "using tool server");
        Ok(Self::new(config, completion, Arc::new(backend)))
    }

    /// Replace the intent fallback used for near-tie classifications.
    pub fn with_intent_fallback(mut self, fallback: Arc<dyn IntentFallback>) -> Self {
        self.classifier = IntentClassifier::new(fallback);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Validating tool dispatcher over this pipeline's backend.
    pub fn tools(&self) -> Arc<ToolDispatcher> {
        self.tools.clone()
    }

    /// Run one query end to end.
    ///
    /// Classifies `query`, retrieves and merges records for the chosen
    /// strategy, and asks the synthesizer for an answer. The query and the
    /// answer are then appended to `session`.
    ///
    /// # Returns
    ///
    /// Always a [`QueryResponse`]. Failed retrieval branches show up in
    /// `warnings`. An empty query or an internal failure produces the
    /// fixed apology with intent `unknown` and confidence 0.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use argo_rag::{config::Config, pipeline::Pipeline, session::Session};
    /// # async fn example() -> anyhow::Result<()> {
    /// let pipeline = Pipeline::from_config(Arc::new(Config::default()))?;
    /// let mut session = Session::new();
    /// let response = pipeline
    ///     .process_query(&mut session, "Count all profiles with temperature > 25")
    ///     .await;
    /// println!("{}", response.answer);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process_query(&self, session: &mut Session, query: &str) -> QueryResponse {
        let started = Instant::now();
        info!(query, session = %session.id(), "processing query");

        let response = match self.run(session, query).await {
            Ok((merged, answer, warnings)) => QueryResponse {
                query: query.to_string(),
                intent: merged.query_context.intent,
                confidence: merged.query_context.confidence,
                metadata: metadata(started, merged.profiles.len(), session),
                merged,
                answer,
                warnings,
            },
            Err(e) => {
                error!(error = %e, query, "query processing failed");
                let context = QueryContext::new(query, QueryIntent::Unknown, 0.0, extract_entities(query));
                let merged = MergedResult {
                    query_context: context,
                    summary: summarize(&[]),
                    profiles: Vec::new(),
                };
                QueryResponse {
                    query: query.to_string(),
                    intent: QueryIntent::Unknown,
                    confidence: 0.0,
                    metadata: metadata(started, 0, session),
                    merged,
                    answer: APOLOGY_ANSWER.to_string(),
                    warnings: vec![e.to_string()],
                }
            }
        };

        session.push_user(query);
        session.push_assistant(response.answer.clone());
        response
    }

    async fn run(&self, session: &Session, query: &str) -> Result<(MergedResult, String, Vec<String>)> {
        if query.trim().is_empty() {
            bail!("query is empty");
        }

        let mut context = self.classifier.classify(query).await;
        let retrieval = self.dispatcher.retrieve(&mut context).await;

        let merged = MergedResult {
            summary: summarize(&retrieval.records),
            profiles: retrieval.records,
            query_context: context,
        };

        let history = session.recent(self.config.retrieval.history_turns);
        let answer = self.synthesizer.respond(&merged, history).await;
        Ok((merged, answer, retrieval.warnings))
    }
}

fn metadata(started: Instant, result_count: usize, session: &Session) -> ResponseMetadata {
    ResponseMetadata {
        execution_ms: started.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
        result_count,
        session_id: session.id().to_string(),
    }
}
