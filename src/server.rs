//! Tool-calling HTTP server.
//!
//! Exposes the [`ToolRegistry`] over a small JSON API for conversational
//! engines that speak plain HTTP, plus an MCP Streamable HTTP endpoint for
//! MCP clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and tool count) |
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a registered tool by name |
//! | `*`    | `/mcp` | MCP JSON-RPC (Streamable HTTP) |
//!
//! # Error Contract
//!
//! Tool outcomes, including failed searches, are returned as `200` with a
//! `{"result": ...}` body. Only routing and malformed requests use error
//! statuses (`400`, `404`, `500`):
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no tool registered with name: foo" } }
//! ```
//!
//! # Cancellation
//!
//! Each request gets its own [`CancellationToken`]. If the client
//! disconnects, axum drops the handler future and the guard cancels the
//! token, which aborts the in-flight knowledge base search.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::mcp::McpBridge;
use crate::traits::{ToolContext, ToolInfo, ToolRegistry};

#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
}

/// Starts the server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    run_server_with_tools(&config.server.bind, tools).await
}

/// Starts the server on an explicit bind address.
///
/// # Example
///
/// ```rust,no_run
/// use knowledge_bridge::server::run_server_with_tools;
/// use knowledge_bridge::traits::ToolRegistry;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let tools = ToolRegistry::new();
/// // tools.register(Box::new(MyTool::new()));
/// run_server_with_tools("127.0.0.1:7331", Arc::new(tools)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server_with_tools(bind_addr: &str, tools: Arc<ToolRegistry>) -> anyhow::Result<()> {
    for t in tools.tools() {
        info!(tool = t.name(), "Registered POST /tools/{}", t.name());
    }

    let app = build_router(tools);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "Knowledge bridge listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Router with every endpoint mounted. Exposed for embedding in a larger
/// axum app.
pub fn build_router(tools: Arc<ToolRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let bridge = McpBridge::new(tools.clone());
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(AppState { tools })
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

fn tool_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "tool_error".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    tools: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: state.tools.len(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.describe(),
    })
}

// ============ POST /tools/{name} ============

/// Dispatches to the named tool. An empty body is treated as `{}`; the
/// tool decides what a missing argument means.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params: serde_json::Value = if body.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = ToolContext::with_cancellation(cancel);

    let result = tool.execute(params, &ctx).await;
    guard.disarm();

    let result = result.map_err(|e| {
        warn!(tool = %name, error = %e, "Tool execution failed");
        tool_error(format!("{}: {}", name, e))
    })?;

    Ok(Json(serde_json::json!({ "result": result })))
}
