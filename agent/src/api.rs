//! HTTP API: rule endpoints, health and the heartbeat receiver stub
//!
//! Handlers are thin: deserialize into typed requests, call the executor,
//! map error results to 400 and spawn failures to 500.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::executor::{ExecutorError, RuleExecutor};
use crate::rules::{Chain, ExecutionResult, Rule};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub executor: Arc<RuleExecutor>,
}

impl AppState {
    pub fn new(config: AgentConfig, executor: RuleExecutor) -> Self {
        Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/rules/add", post(add_rule))
        .route("/rules/delete", post(delete_rule))
        .route("/rules/list", get(list_rules))
        .route("/rules/flush", post(flush_rules))
        .route("/rules/save", post(save_rules))
        .route("/heartbeat", post(receive_heartbeat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// --- API Types ---

#[derive(Serialize)]
struct RootResponse {
    message: String,
    agent_name: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    agent_name: String,
    timestamp: String,
}

#[derive(Deserialize)]
struct ListQuery {
    chain: Option<Chain>,
}

#[derive(Deserialize)]
struct FlushQuery {
    chain: Chain,
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    agent_token: String,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    system_info: Option<serde_json::Value>,
}

fn default_status() -> String {
    "online".to_string()
}

#[derive(Serialize)]
struct HeartbeatAck {
    message: String,
    status: String,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Errors surfaced to HTTP callers as `{"detail": ...}`
#[derive(Debug)]
pub enum ApiError {
    /// The firewall tool rejected the request
    Tool(String),
    /// The firewall tool could not be run
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Tool(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

fn respond(
    result: Result<ExecutionResult, ExecutorError>,
) -> Result<Json<ExecutionResult>, ApiError> {
    match result {
        Ok(result) if result.is_success() => Ok(Json(result)),
        Ok(result) => Err(ApiError::Tool(result.message)),
        Err(e) => {
            error!("Executor failure: {e}");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

// --- Handlers ---

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "fwagent is running".into(),
        agent_name: state.config.agent.name.clone(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        agent_name: state.config.agent.name.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn add_rule(
    State(state): State<AppState>,
    Json(rule): Json<Rule>,
) -> Result<Json<ExecutionResult>, ApiError> {
    respond(state.executor.add_rule(&rule).await)
}

async fn delete_rule(
    State(state): State<AppState>,
    Json(rule): Json<Rule>,
) -> Result<Json<ExecutionResult>, ApiError> {
    respond(state.executor.delete_rule(&rule).await)
}

async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ExecutionResult>, ApiError> {
    respond(state.executor.list_rules(query.chain).await)
}

async fn flush_rules(
    State(state): State<AppState>,
    Query(query): Query<FlushQuery>,
) -> Result<Json<ExecutionResult>, ApiError> {
    info!("Flush requested for chain {}", query.chain);
    respond(state.executor.flush_chain(query.chain).await)
}

async fn save_rules(State(state): State<AppState>) -> Result<Json<ExecutionResult>, ApiError> {
    respond(state.executor.save_rules().await)
}

/// Local stub: acknowledges and drops the heartbeat
async fn receive_heartbeat(Json(req): Json<HeartbeatRequest>) -> Json<HeartbeatAck> {
    let token_prefix: String = req.agent_token.chars().take(8).collect();
    debug!(
        "Heartbeat received (token {token_prefix}..., status {}, system_info: {})",
        req.status,
        req.system_info.is_some()
    );
    Json(HeartbeatAck {
        message: "Heartbeat received".into(),
        status: "online".into(),
    })
}
