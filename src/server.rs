//! JSON HTTP server.
//!
//! Exposes retrieval and question answering over HTTP for browser front ends
//! and scripts. Every handler shares one [`RagContext`] built at startup.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and store summary |
//! | `POST` | `/search` | Retrieval only: `{question, top_k?}` → `{results}` |
//! | `POST` | `/ask` | Retrieval + generation: `{question, top_k?}` → `{answer, sources}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid input: question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `empty_corpus` (503),
//! `provider_unavailable` (502), `generation_error` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::RagError;
use crate::models::{Answer, SourcePassage};
use crate::pipeline::RagContext;

/// Starts the HTTP server on `[server].bind`.
///
/// Loads the store and both providers first; a missing API key or an
/// embedding-space mismatch aborts before the socket is bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = RagContext::from_config(config)?;
    run_server_with_context(&config.server.bind, ctx).await
}

/// Starts the server with an already constructed context.
///
/// Runs until the process is terminated.
pub async fn run_server_with_context(bind_addr: &str, ctx: RagContext) -> anyhow::Result<()> {
    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("film-rag server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with all routes and the CORS layer.
pub fn router(ctx: RagContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::EmptyCorpus => (StatusCode::SERVICE_UNAVAILABLE, "empty_corpus"),
            RagError::ProviderUnavailable { .. } => (StatusCode::BAD_GATEWAY, "provider_unavailable"),
            RagError::Generation { .. } => (StatusCode::BAD_GATEWAY, "generation_error"),
        };
        if status.is_server_error() {
            warn!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: rejection.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    chunks: usize,
    dims: usize,
    model: Option<String>,
}

async fn handle_health(State(ctx): State<RagContext>) -> Json<HealthResponse> {
    let store = ctx.store();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        chunks: store.len(),
        dims: store.dims(),
        model: store.model().map(str::to_string),
    })
}

// ============ POST /search and /ask ============

/// Request body shared by `/search` and `/ask`.
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SourcePassage>,
}

async fn handle_search(
    State(ctx): State<RagContext>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body?;
    let results = ctx.retrieve(&req.question, req.top_k).await?;
    Ok(Json(SearchResponse { results }))
}

async fn handle_ask(
    State(ctx): State<RagContext>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = body?;
    let answer = ctx.ask(&req.question, req.top_k).await?;
    info!(sources = answer.sources.len(), "answered question");
    Ok(Json(answer))
}
