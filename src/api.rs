use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::store::{CommandKind, RecordOrder, RecordQuery, RecordRow, Store};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub metrics: Option<PrometheusHandle>,
}

/// Read-only status surface plus the "run now" inbox.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/records", get(records))
        .route("/logs", get(logs))
        .route("/commands", post(enqueue_command))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "store": state.store.backend() }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[derive(Deserialize)]
struct RecordsParams {
    limit: Option<usize>,
    min_risk: Option<u8>,
    #[serde(default)]
    order: RecordOrder,
}

async fn records(
    State(state): State<AppState>,
    Query(p): Query<RecordsParams>,
) -> Json<Vec<RecordRow>> {
    let query = RecordQuery {
        limit: clamp_limit(p.limit),
        min_risk: p.min_risk,
        order: p.order,
    };
    let rows = state
        .store
        .query_records(&query)
        .await
        .iter()
        .map(RecordRow::from_record)
        .collect();
    Json(rows)
}

#[derive(Deserialize)]
struct LogsParams {
    limit: Option<usize>,
}

async fn logs(State(state): State<AppState>, Query(p): Query<LogsParams>) -> impl IntoResponse {
    Json(state.store.recent_logs(clamp_limit(p.limit)).await)
}

#[derive(Deserialize)]
struct CommandReq {
    command: String,
}

async fn enqueue_command(
    State(state): State<AppState>,
    Json(body): Json<CommandReq>,
) -> impl IntoResponse {
    let kind = CommandKind::parse(&body.command);
    if let CommandKind::Unsupported(other) = &kind {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("unsupported command: {other}") })),
        );
    }
    match state.store.enqueue_command(kind).await {
        Some(cmd) => (
            StatusCode::CREATED,
            Json(serde_json::to_value(cmd).unwrap_or_default()),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "command inbox unavailable" })),
        ),
    }
}
