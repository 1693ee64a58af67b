//! Unauthenticated read surface: current status, per-endpoint uptime, and
//! the incident history. Each handler follows the same
//! `State(state) -> Path/Query -> Result<Json<_>, ApiError>` shape.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use uuid::Uuid;

use sentinel_broadcast::EndpointStatus;
use sentinel_core::{EndpointState, Incident, UptimeStats};
use sentinel_cache::TypedCache;
use sentinel_repository::Page;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const UPTIME_CACHE_TTL: Duration = Duration::from_secs(60);

/// `GET /status` — every enabled endpoint and its currently derived state.
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<Vec<EndpointStatus>>> {
    let endpoints = state.repository().list_all_enabled_endpoints().await?;
    let statuses = endpoints
        .into_iter()
        .map(|endpoint| EndpointStatus {
            endpoint_id: endpoint.id,
            state: state
                .current_states()
                .get(&endpoint.id)
                .map(|entry| *entry.value())
                .unwrap_or(EndpointState::Unknown),
        })
        .collect();
    Ok(Json(statuses))
}

#[derive(Debug, Deserialize)]
pub struct UptimeQuery {
    #[serde(default = "default_uptime_days")]
    pub days: u32,
}

fn default_uptime_days() -> u32 {
    90
}

/// `GET /uptime/{endpoint_id}` — rolling uptime percentage over a window.
pub async fn uptime(
    State(state): State<AppState>,
    Path(endpoint_id): Path<Uuid>,
    Query(query): Query<UptimeQuery>,
) -> ApiResult<Json<UptimeStats>> {
    // Touch the endpoint so an unknown id surfaces as 404 rather than an
    // empty-but-200 stats window.
    state.repository().get_endpoint(endpoint_id).await?;

    let key = sentinel_cache::keys::uptime_stats(endpoint_id, query.days);
    if let Some(cached) = state.cache().get_json::<UptimeStats>(&key).await? {
        return Ok(Json(cached));
    }
    let stats = state.repository().uptime_stats(endpoint_id, query.days).await?;
    state.cache().set_json(&key, &stats, UPTIME_CACHE_TTL).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

fn normalize(query: &PageQuery) -> Page {
    Page {
        page: query.page.max(1),
        limit: query.limit.clamp(1, 200),
    }
}

/// `GET /incidents` — paginated incident history, newest first.
pub async fn incidents(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Incident>>> {
    let page = normalize(&query);
    let incidents = state.repository().list_incidents(page).await?;
    Ok(Json(incidents))
}

/// `GET /incidents/{date}` — incidents overlapping a single UTC calendar
/// day, `date` formatted `YYYY-MM-DD`.
pub async fn incidents_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> ApiResult<Json<Vec<Incident>>> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| ApiError::Validation {
        field: "date".into(),
        reason: "must be formatted YYYY-MM-DD".into(),
    })?;
    let day_start = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("midnight is always valid"));
    let day_end = Utc.from_utc_datetime(&day.and_hms_opt(23, 59, 59).expect("23:59:59 is always valid"));

    let incidents = state
        .repository()
        .list_incidents_overlapping(day_start, day_end)
        .await?;
    Ok(Json(incidents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps_limit_and_floors_page_at_one() {
        let page = normalize(&PageQuery { page: 0, limit: 10_000 });
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 200);
    }
}
