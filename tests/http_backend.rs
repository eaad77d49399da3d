//! `HttpBackend` + `ToolDispatcher` against a scripted tool server on an
//! ephemeral port.

use argo_rag::backend::{HttpBackend, RetrievalBackend};
use argo_rag::config::{BackendConfig, RetrievalConfig};
use argo_rag::error::BackendError;
use argo_rag::protocol::ToolCall;
use argo_rag::retry::RetryPolicy;
use argo_rag::tools::{ToolDefaults, ToolDispatcher};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Replies with the scripted statuses in order, then 200 with an envelope.
#[derive(Clone, Default)]
struct ToolServer {
    statuses: Arc<Mutex<Vec<u16>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn handle_mcp(
    State(server): State<ToolServer>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    server.bodies.lock().unwrap().push(body.clone());
    let next = {
        let mut statuses = server.statuses.lock().unwrap();
        if statuses.is_empty() {
            None
        } else {
            Some(statuses.remove(0))
        }
    };

    match next {
        Some(code) => (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"error": "scripted failure"})),
        ),
        None => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {"profiles": [{"id": "2902746_101"}], "similarities": [0.9]},
                "metadata": {"tool": body["params"]["name"]}
            })),
        ),
    }
}

/// Serve the scripted tool server and return its base URL.
async fn spawn_tool_server(statuses: Vec<u16>) -> (String, ToolServer) {
    let server = ToolServer {
        statuses: Arc::new(Mutex::new(statuses)),
        ..Default::default()
    };
    let app = Router::new()
        .route("/mcp", post(handle_mcp))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{}", port), server)
}

fn backend_config(url: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        timeout_secs: 5,
        max_attempts: 3,
        backoff_base_ms: 20,
    }
}

fn dispatcher(url: &str) -> ToolDispatcher {
    let config = backend_config(url);
    let backend = Arc::new(HttpBackend::new(&config).unwrap());
    ToolDispatcher::new(
        backend,
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        },
        ToolDefaults::from(&RetrievalConfig::default()),
    )
}

#[tokio::test]
async fn test_transient_statuses_are_retried() {
    let (url, server) = spawn_tool_server(vec![503, 503]).await;
    let dispatcher = dispatcher(&url);

    let call = ToolCall::new("retrieveARGO", json!({"query": "monsoon mixed layer"}), "call_0");
    let started = Instant::now();
    let result = dispatcher.dispatch(&call).await;
    let elapsed = started.elapsed();

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.call_id, "call_0");
    assert_eq!(result.metadata["tool"], "retrieveARGO");
    assert_eq!(server.bodies.lock().unwrap().len(), 3);
    // 20ms before the second attempt, 40ms before the third.
    assert!(elapsed >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (url, server) = spawn_tool_server(vec![400]).await;
    let dispatcher = dispatcher(&url);

    let call = ToolCall::new("queryARGO", json!({"sql": "SELECT 1"}), "call_0");
    let result = dispatcher.dispatch(&call).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("400"));
    assert_eq!(server.bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_last_error() {
    let (url, server) = spawn_tool_server(vec![502, 502, 502, 502]).await;
    let dispatcher = dispatcher(&url);

    let call = ToolCall::new("retrieveARGO", json!({"query": "gyre"}), "call_0");
    let result = dispatcher.dispatch(&call).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("502"));
    assert_eq!(server.bodies.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_request_body_shape() {
    let (url, server) = spawn_tool_server(vec![]).await;
    let dispatcher = dispatcher(&url);

    let call = ToolCall::new(
        "getARGOByLocation",
        json!({"latitude": 15.0, "longitude": 65.0}),
        "call_0",
    );
    let result = dispatcher.dispatch(&call).await;
    assert!(result.success);

    let bodies = server.bodies.lock().unwrap();
    assert_eq!(bodies[0]["method"], "tools/call");
    assert_eq!(bodies[0]["params"]["name"], "getARGOByLocation");
    assert_eq!(bodies[0]["params"]["arguments"]["latitude"], 15.0);
    assert_eq!(bodies[0]["params"]["arguments"]["radius"], 100.0);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let backend = HttpBackend::new(&backend_config(&format!("http://127.0.0.1:{}", port))).unwrap();
    let err = backend
        .call("retrieveARGO", &json!({"query": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Transport(_)));
}
