#![allow(dead_code)]

use argo_rag::backend::RetrievalBackend;
use argo_rag::classifier::IntentFallback;
use argo_rag::completion::{CompletionClient, CompletionRequest};
use argo_rag::config::Config;
use argo_rag::error::{BackendError, CompletionError};
use argo_rag::models::QueryIntent;
use argo_rag::pipeline::Pipeline;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Completion double that answers by prompt kind:
/// - intent classification → `verdict`
/// - SQL generation → a query built from the extracted entities
/// - anything else → `answer`
pub struct FakeLlm {
    pub verdict: String,
    pub answer: Option<String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeLlm {
    fn build(verdict: &str, answer: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            verdict: verdict.to_string(),
            answer: answer.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(
            r#"{"intent": "semantic", "confidence": 0.6}"#,
            Some("Surface temperature in these profiles stays above 27 °C with a shallow thermocline."),
        )
    }

    pub fn with_verdict(verdict: &str) -> Arc<Self> {
        Self::build(
            verdict,
            Some("Surface temperature in these profiles stays above 27 °C with a shallow thermocline."),
        )
    }

    /// Classification and SQL generation work; answer synthesis fails.
    pub fn failing_answers() -> Arc<Self> {
        Self::build(r#"{"intent": "semantic", "confidence": 0.6}"#, None)
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl CompletionClient for FakeLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());

        if request.system_prompt.contains("Classify the user's query") {
            return Ok(self.verdict.clone());
        }
        if request.system_prompt.contains("SQL query generator") {
            let entities = request
                .user_content
                .split("Extracted entities: ")
                .nth(1)
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
                .unwrap_or(Value::Null);
            let sql = match entities["numbers"].get(0).and_then(|n| n.as_f64()) {
                Some(threshold) => format!(
                    "```sql\nSELECT COUNT(*) FROM argo_profiles WHERE surface_temp > {}\n```",
                    threshold
                ),
                None => "SELECT * FROM argo_profiles LIMIT 10".to_string(),
            };
            return Ok(sql);
        }
        self.answer
            .clone()
            .ok_or_else(|| CompletionError::Status {
                status: 503,
                body: "overloaded".into(),
            })
    }
}

/// Fallback double that counts invocations.
pub struct CountingFallback {
    pub intent: QueryIntent,
    pub confidence: f64,
    pub calls: AtomicUsize,
}

impl CountingFallback {
    pub fn new(intent: QueryIntent, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            intent,
            confidence,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentFallback for CountingFallback {
    async fn classify(&self, _text: &str) -> Result<(QueryIntent, f64), CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.intent, self.confidence))
    }
}

/// Tool server double with canned ARGO data.
pub struct FakeBackend {
    pub failing: Vec<String>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(tools: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: tools.iter().map(|t| t.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn tools_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl RetrievalBackend for FakeBackend {
    async fn call(&self, tool: &str, arguments: &Value) -> Result<Value, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), arguments.clone()));

        if self.failing.iter().any(|t| t == tool) {
            return Ok(json!({"success": false, "error": "relation \"argo_profiles\" is locked"}));
        }

        Ok(match tool {
            "queryARGO" => json!({
                "success": true,
                "data": {
                    "rows": [
                        {"id": "2902746_101", "platform_number": "2902746", "cycle_number": 101,
                         "latitude": 15.2, "longitude": 64.8, "date": "2023-05-02",
                         "surface_temp": 28.5, "surface_sal": 36.1, "thermocline_depth": 60.0},
                        {"id": "2902746_102", "platform_number": "2902746", "cycle_number": 102,
                         "latitude": 15.9, "longitude": 65.3, "date": "2023-05-12",
                         "surface_temp": 29.0, "surface_sal": 36.3}
                    ],
                    "metadata": {"total_count": 2, "page": 1, "page_size": 100, "has_next": false}
                }
            }),
            _ => json!({
                "success": true,
                "data": {
                    "profiles": [
                        {"id": "2902746_101", "float_id": "2902746", "lat": 15.2, "lon": 64.8,
                         "surfacetemp": 28.4, "summary": "Warm Arabian Sea surface layer"},
                        {"id": "5906517_33", "float_id": "5906517", "lat": 18.0, "lon": 62.1,
                         "surfacetemp": 27.6, "surfacesal": 36.6}
                    ],
                    "similarities": [0.92, 0.81]
                }
            }),
        })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.backend.backoff_base_ms = 1;
    config.completion.backoff_base_ms = 1;
    config
}

pub fn pipeline(llm: Arc<FakeLlm>, backend: Arc<FakeBackend>) -> Pipeline {
    Pipeline::new(Arc::new(test_config()), llm, backend)
}
