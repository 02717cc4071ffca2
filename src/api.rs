//! Thin HTTP facade: decode the request, call the orchestrator, encode the
//! outcome. No execution logic lives here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    error::ExecError,
    executor::Orchestrator,
    metrics::MetricsRegistry,
    models::{ExecutionOutcome, ExecutionRequest},
};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<MetricsRegistry>,
}

pub fn routes(orchestrator: Arc<Orchestrator>, metrics: Arc<MetricsRegistry>) -> Router {
    let state = AppState {
        orchestrator,
        metrics,
    };
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/run", post(run_code))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "sandboxes_in_flight": state.orchestrator.in_flight(),
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render_prometheus())
}

async fn run_code(
    State(state): State<AppState>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionOutcome>, ExecError> {
    tracing::info!(language = %request.language, code_bytes = request.code.len(), "execution requested");
    let outcome = state.orchestrator.execute(request).await?;
    Ok(Json(outcome))
}
