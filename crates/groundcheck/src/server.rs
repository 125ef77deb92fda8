//! HTTP server.
//!
//! A thin JSON layer over [`Pipeline`]; every handler calls exactly one
//! pipeline operation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Knowledge store generation and size |
//! | `POST` | `/documents/ingest` | Rebuild the knowledge base from a directory |
//! | `POST` | `/tests/generate` | Grounded test cases for a query |
//! | `POST` | `/scripts/generate` | Automation script for one test case |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "malformed_generation", "message": "...", "stage": "test_cases", "raw": "..." } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `empty_input` | 400 |
//! | `insufficient_specification` | 422 |
//! | `malformed_generation`, `backend_error` | 502 |
//! | `store_rebuilding` | 503 |
//! | `timeout` | 504 |
//! | `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser dashboard
//! can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use groundcheck_core::models::TestCase;
use groundcheck_core::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::pipeline::{IngestSummary, Pipeline};

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "server listening");
    println!("Groundcheck server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/documents/ingest", post(handle_ingest))
        .route("/tests/generate", post(handle_generate_tests))
        .route("/scripts/generate", post(handle_generate_script))
        .layer(cors)
        .with_state(pipeline)
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
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    /// Untouched generation output, for malformed generations.
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
}

struct AppError {
    status: StatusCode,
    detail: ErrorDetail,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.detail })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        detail: ErrorDetail {
            code: "bad_request".to_string(),
            message: message.into(),
            stage: None,
            raw: None,
        },
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::EmptyInput { .. } | Error::InvalidChunking { .. } => StatusCode::BAD_REQUEST,
            Error::InsufficientSpecification { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::MalformedGeneration { .. } | Error::Embedding(_) | Error::Generation { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Error::StoreRebuilding { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::GenerationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        AppError {
            status,
            detail: ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
                stage: err.stage().map(|s| s.as_str().to_string()),
                raw: err.raw_payload().map(str::to_string),
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(core) => core.into(),
            Err(other) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: ErrorDetail {
                    code: "internal".to_string(),
                    message: format!("{:#}", other),
                    stage: None,
                    raw: None,
                },
            },
        }
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(e.body_text()))
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

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    generation: u64,
    chunk_count: usize,
    rebuilding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    built_at: Option<DateTime<Utc>>,
    sources: Vec<String>,
}

async fn handle_status(State(pipeline): State<Arc<Pipeline>>) -> Json<StatusResponse> {
    let status = pipeline.status();
    // A rebuild in progress hides the snapshot; report the counters only.
    let snapshot = pipeline.store().snapshot().ok().flatten();
    Json(StatusResponse {
        generation: status.generation,
        chunk_count: status.chunk_count,
        rebuilding: status.rebuilding,
        model: snapshot.as_ref().map(|kb| kb.model().to_string()),
        built_at: snapshot.as_ref().map(|kb| kb.built_at()),
        sources: snapshot
            .as_ref()
            .map(|kb| kb.sources().into_iter().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

// ============ POST /documents/ingest ============

#[derive(Deserialize, Default)]
struct IngestRequest {
    #[serde(default)]
    root: Option<PathBuf>,
}

async fn handle_ingest(
    State(pipeline): State<Arc<Pipeline>>,
    body: Option<Json<IngestRequest>>,
) -> Result<Json<IngestSummary>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let root = request.root.as_deref();
    if let Some(root) = root {
        if !root.is_dir() {
            return Err(bad_request(format!(
                "root is not a directory: {}",
                root.display()
            )));
        }
    }
    Ok(Json(pipeline.ingest(root).await?))
}

// ============ POST /tests/generate ============

#[derive(Deserialize)]
struct GenerateTestsRequest {
    query: String,
}

#[derive(Serialize)]
struct GenerateTestsResponse {
    test_cases: Vec<TestCase>,
}

async fn handle_generate_tests(
    State(pipeline): State<Arc<Pipeline>>,
    body: Result<Json<GenerateTestsRequest>, JsonRejection>,
) -> Result<Json<GenerateTestsResponse>, AppError> {
    let request = json_body(body)?;
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let test_cases = pipeline.generate_test_cases(&request.query).await?;
    Ok(Json(GenerateTestsResponse { test_cases }))
}

// ============ POST /scripts/generate ============

#[derive(Deserialize)]
struct GenerateScriptRequest {
    test_case: TestCase,
    html: String,
}

#[derive(Serialize)]
struct GenerateScriptResponse {
    test_id: String,
    rule: String,
    script: String,
}

async fn handle_generate_script(
    State(pipeline): State<Arc<Pipeline>>,
    body: Result<Json<GenerateScriptRequest>, JsonRejection>,
) -> Result<Json<GenerateScriptResponse>, AppError> {
    let request = json_body(body)?;
    let script = pipeline
        .generate_script(&request.test_case, &request.html)
        .await?;
    Ok(Json(GenerateScriptResponse {
        test_id: script.test_id,
        rule: script.rule,
        script: script.source,
    }))
}
