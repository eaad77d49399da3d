//! HTTP API.
//!
//! Exposes the query pipeline and the four ARGO tools as a JSON API.
//! Every request gets its own [`Session`]; no history is shared between
//! requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/tools/list` | List tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call one tool with a JSON arguments object |
//! | `POST` | `/classify` | Classify `{"query": ...}` without retrieving |
//! | `POST` | `/query` | Run the full pipeline for `{"query": ...}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404). A body that is not
//! JSON, lacks a JSON content type, or does not match the expected shape is
//! also a `bad_request`.
//!
//! A tool call that reaches the backend and fails is not an HTTP error: it
//! returns 200 with `result.success == false`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::ToolCallError;
use crate::models::{QueryContext, QueryResponse};
use crate::pipeline::Pipeline;
use crate::protocol::{ToolCall, ToolResult};
use crate::session::Session;
use crate::tools::{tool_infos, ToolInfo};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Build the router. Split from [`run_server`] so tests can serve it on an
/// ephemeral port.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/classify", post(handle_classify))
        .route("/query", post(handle_query))
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(address = %bind_addr, "argo API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<ToolCallError> for AppError {
    fn from(e: ToolCallError) -> Self {
        match e {
            ToolCallError::UnknownTool(_) => not_found(e.to_string()),
            _ => bad_request(e.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: tool_infos(),
    })
}

// ============ POST /tools/{name} ============

#[derive(Serialize)]
struct ToolCallResponse {
    result: ToolResult,
}

/// Returns `404` for an unknown tool and `400` when arguments fail
/// validation; both are checked before the backend is contacted.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ToolCallResponse>, AppError> {
    let Json(arguments) = payload?;
    if !arguments.is_object() {
        return Err(ToolCallError::ArgumentsNotObject(name).into());
    }

    let call = ToolCall::new(name, arguments, "http");
    let tools = state.pipeline.tools();
    tools.prepare(&call)?;

    let result = tools.dispatch(&call).await;
    Ok(Json(ToolCallResponse { result }))
}

// ============ POST /classify and /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

impl QueryRequest {
    fn validated(self) -> Result<String, AppError> {
        if self.query.trim().is_empty() {
            return Err(bad_request("query must not be empty"));
        }
        Ok(self.query)
    }
}

async fn handle_classify(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryContext>, AppError> {
    let Json(req) = payload?;
    let query = req.validated()?;
    Ok(Json(state.pipeline.classifier().classify(&query).await))
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = payload?;
    let query = req.validated()?;
    let mut session = Session::new();
    Ok(Json(state.pipeline.process_query(&mut session, &query).await))
}
