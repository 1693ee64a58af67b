//! Health endpoints. `/health` and `/health/live` are process-liveness
//! checks with no dependency round-trip; `/health/ready` actually
//! exercises the repository and cache.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::time::timeout;

use crate::state::AppState;

const READY_DEADLINE: Duration = Duration::from_secs(1);
const READY_PROBE_KEY: &str = "sentinel:health:ready-probe";

/// `GET /health` — the service process is up and able to answer HTTP.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/live` — same contract as `/health`; kept as a distinct
/// route so an orchestrator's liveness and readiness probes never collide
/// on the same path.
pub async fn live() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready` — repository ping plus a cache round-trip, each
/// bounded by a 1s deadline. A 503 names every dependency that failed.
pub async fn ready(State(state): State<AppState>) -> Response {
    let repo_ok = timeout(READY_DEADLINE, state.repository().ping())
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    let cache_ok = timeout(READY_DEADLINE, state.cache().exists(READY_PROBE_KEY))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    if repo_ok && cache_ok {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        let mut failing = Vec::new();
        if !repo_ok {
            failing.push("repository");
        }
        if !cache_ok {
            failing.push("cache");
        }
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "failing": failing })),
        )
            .into_response()
    }
}
