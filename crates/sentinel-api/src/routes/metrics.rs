//! `/admin/metrics` — a plain JSON snapshot of the process counters, not a
//! Prometheus exporter.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let metrics = state.metrics();
    let deliveries: Vec<_> = metrics
        .delivery_snapshot()
        .into_iter()
        .map(|(channel, sent, failed)| json!({ "provider": channel, "sent": sent, "failed": failed }))
        .collect();

    Json(json!({
        "probes_executed": metrics.probes_executed.load(Ordering::Relaxed),
        "probes_failed": metrics.probes_failed.load(Ordering::Relaxed),
        "incidents_opened": metrics.incidents_opened.load(Ordering::Relaxed),
        "incidents_resolved": metrics.incidents_resolved.load(Ordering::Relaxed),
        "notifications": deliveries,
        "active_sse_subscribers": state.broadcast().subscriber_count(),
    }))
}
