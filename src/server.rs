//! HTTP and stdio serving.
//!
//! In `http` mode one listener carries the MCP streamable HTTP endpoint and
//! a small JSON API around the same [`ToolRegistry`]:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `*`    | `/mcp` | MCP streamable HTTP transport |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Status, version and published docs commit |
//! | `GET`  | `/metrics` | Prometheus text exposition |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `updates_disabled` (400), `not_found` (404),
//! `timeout` (408), `tool_error` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use rmcp::ServiceExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::mcp::McpBridge;
use crate::metrics::Metrics;
use crate::traits::{ToolContext, ToolRegistry};
use crate::version::VERSION;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
    metrics: Arc<Metrics>,
}

/// Build the full HTTP router, `/mcp` included.
pub fn router(tools: Arc<ToolRegistry>, ctx: ToolContext, metrics: Arc<Metrics>) -> Router {
    let bridge = McpBridge::new(tools.clone(), ctx.clone(), metrics.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let state = AppState {
        tools,
        ctx,
        metrics,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(state)
}

/// Serve `router` on `bind` until `shutdown` fires.
pub async fn run_http(bind: &str, router: Router, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "MCP server listening (streamable HTTP at /mcp)");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Serve MCP over stdin/stdout until the client disconnects or `shutdown` fires.
pub async fn run_stdio(bridge: McpBridge, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("MCP server running on stdio");
    let service = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Ok(()),
        result = bridge.serve(stdio()) => result?,
    };

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("shutting down stdio transport");
        }
        reason = service.waiting() => {
            match reason {
                Ok(reason) => info!(?reason, "stdio client disconnected"),
                Err(err) => warn!(error = %err, "stdio transport ended with error"),
            }
        }
    }
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

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Maps tool error messages to HTTP statuses so built-in tools can signal
/// client errors without a dedicated error type on [`crate::traits::Tool`].
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = format!("{}: {}", tool_name, err);
    let raw = err.to_string();

    if raw.starts_with("docs update failed") {
        // Sync failures are upstream faults.
        app_error(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", msg)
    } else if raw.contains("document not found") {
        not_found(msg)
    } else if raw.contains("disabled") {
        app_error(StatusCode::BAD_REQUEST, "updates_disabled", msg)
    } else if raw.contains("must not be")
        || raw.contains("must be")
        || raw.contains("failed to parse")
        || raw.contains("invalid")
    {
        bad_request(msg)
    } else if raw.contains("timed out") {
        app_error(StatusCode::REQUEST_TIMEOUT, "timeout", msg)
    } else {
        app_error(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    docs_commit: String,
    docs_files: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let current = state.ctx.state().current();
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        docs_commit: current.commit.clone(),
        docs_files: current.snapshot.len(),
    })
}

// ============ GET /metrics ============

async fn handle_metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.metrics.render().map_err(|e| {
        app_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("failed to encode metrics: {}", e),
        )
    })?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    read_only: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            read_only: t.read_only(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Returns `404` for an unknown tool, `400` for invalid parameters, `408` for
/// timeouts and `500` for other execution errors.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = match params {
        serde_json::Value::Null => serde_json::json!({}),
        serde_json::Value::Object(_) => params,
        _ => return Err(bad_request("parameters must be a JSON object")),
    };

    let started = Instant::now();
    let result = tool.execute(params, &state.ctx).await;
    state
        .metrics
        .observe_tool_call(tool.name(), started.elapsed(), result.is_err());

    let result = result.map_err(|e| classify_tool_error(&name, e))?;
    Ok(Json(serde_json::json!({ "result": result })))
}
