//! Admin CRUD surface. Thin handlers: validate, delegate to
//! `Repository`/`Scheduler`/cache invalidation, return the stored value —
//! there is deliberately no service layer between these handlers and the
//! crates they call.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use sentinel_cache::TypedCache;
use sentinel_core::{
    ChannelType, DeliveryResult, Endpoint, EndpointIncident, HttpMethod, Incident, IncidentOrigin,
    IncidentStatus, NotificationChannelConfig, NotificationEvent, NotificationKind, ProbeResult,
    Severity,
};
use sentinel_engine::ControlEvent;
use sentinel_repository::{DeliveryRecord, Page, ProbeLogFilter};

use crate::error::{ApiError, ApiResult};
use crate::routes::public::PageQuery;
use crate::state::AppState;

const ENDPOINT_CACHE_TTL: Duration = Duration::from_secs(60);
const ENDPOINT_LIST_CACHE_TTL: Duration = Duration::from_secs(30);

fn page_from(query: &PageQuery, max_limit: u32) -> Page {
    Page {
        page: query.page.max(1),
        limit: query.limit.clamp(1, max_limit),
    }
}

// -- Endpoints ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
    pub interval_secs: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub expected_status: Option<Vec<u16>>,
    pub max_retry_attempts: Option<u8>,
    pub retry_backoff_secs: Option<u32>,
    pub critical: Option<bool>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEndpointRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
    pub interval_secs: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub expected_status: Option<Vec<u16>>,
    pub max_retry_attempts: Option<u8>,
    pub retry_backoff_secs: Option<u32>,
    pub critical: Option<bool>,
    pub enabled: Option<bool>,
}

impl UpdateEndpointRequest {
    fn apply_to(self, endpoint: &mut Endpoint) {
        if let Some(name) = self.name {
            endpoint.name = name;
        }
        if self.description.is_some() {
            endpoint.description = self.description;
        }
        if let Some(url) = self.url {
            endpoint.url = url;
        }
        if let Some(method) = self.method {
            endpoint.method = method;
        }
        if let Some(headers) = self.headers {
            endpoint.headers = headers;
        }
        if self.body.is_some() {
            endpoint.body = self.body;
        }
        if let Some(interval_secs) = self.interval_secs {
            endpoint.interval_secs = interval_secs;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            endpoint.timeout_secs = timeout_secs;
        }
        if let Some(expected_status) = self.expected_status {
            endpoint.expected_status = expected_status;
        }
        if let Some(max_retry_attempts) = self.max_retry_attempts {
            endpoint.max_retry_attempts = max_retry_attempts;
        }
        if let Some(retry_backoff_secs) = self.retry_backoff_secs {
            endpoint.retry_backoff_secs = retry_backoff_secs;
        }
        if let Some(critical) = self.critical {
            endpoint.critical = critical;
        }
        if let Some(enabled) = self.enabled {
            endpoint.enabled = enabled;
        }
    }
}

async fn invalidate_endpoint_caches(state: &AppState, id: Uuid) -> ApiResult<()> {
    state.cache().delete(&sentinel_cache::keys::endpoint(id)).await?;
    state
        .cache()
        .delete_pattern(sentinel_cache::keys::endpoints_prefix())
        .await?;
    Ok(())
}

pub async fn create_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateEndpointRequest>,
) -> ApiResult<(StatusCode, Json<Endpoint>)> {
    let now = Utc::now();
    let endpoint = Endpoint {
        id: Uuid::new_v4(),
        name: payload.name,
        description: payload.description,
        url: payload.url,
        method: payload.method.unwrap_or(HttpMethod::Get),
        headers: payload.headers.unwrap_or_default(),
        body: payload.body,
        interval_secs: payload.interval_secs.unwrap_or(60),
        timeout_secs: payload.timeout_secs.unwrap_or(5),
        expected_status: payload
            .expected_status
            .unwrap_or_else(Endpoint::default_expected_status),
        max_retry_attempts: payload.max_retry_attempts.unwrap_or(2),
        retry_backoff_secs: payload.retry_backoff_secs.unwrap_or(1),
        critical: payload.critical.unwrap_or(false),
        enabled: payload.enabled.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };
    endpoint.validate()?;

    let created = state.repository().create_endpoint(endpoint).await?;
    invalidate_endpoint_caches(&state, created.id).await?;
    if created.enabled {
        state.scheduler().apply(ControlEvent::Add(created.clone())).await;
    }
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
pub struct ListEndpointsQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    #[serde(default)]
    pub enabled: Option<bool>,
}

pub async fn list_endpoints(
    State(state): State<AppState>,
    Query(query): Query<ListEndpointsQuery>,
) -> ApiResult<Json<Vec<Endpoint>>> {
    let page = page_from(&query.page, 200);
    let enabled_only = query.enabled.unwrap_or(false);
    let key = sentinel_cache::keys::endpoints_page(page.page, page.limit, enabled_only);
    if let Some(cached) = state.cache().get_json::<Vec<Endpoint>>(&key).await? {
        return Ok(Json(cached));
    }
    let endpoints = state.repository().list_endpoints(enabled_only, page).await?;
    state.cache().set_json(&key, &endpoints, ENDPOINT_LIST_CACHE_TTL).await?;
    Ok(Json(endpoints))
}

pub async fn get_endpoint(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Endpoint>> {
    let key = sentinel_cache::keys::endpoint(id);
    if let Some(cached) = state.cache().get_json::<Endpoint>(&key).await? {
        return Ok(Json(cached));
    }
    let endpoint = state.repository().get_endpoint(id).await?;
    state.cache().set_json(&key, &endpoint, ENDPOINT_CACHE_TTL).await?;
    Ok(Json(endpoint))
}

pub async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEndpointRequest>,
) -> ApiResult<Json<Endpoint>> {
    let mut endpoint = state.repository().get_endpoint(id).await?;
    payload.apply_to(&mut endpoint);
    endpoint.updated_at = Utc::now();
    endpoint.validate()?;

    let updated = state.repository().update_endpoint(endpoint).await?;
    invalidate_endpoint_caches(&state, id).await?;
    state.scheduler().apply(ControlEvent::Update(updated.clone())).await;
    Ok(Json(updated))
}

pub async fn delete_endpoint(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.repository().delete_endpoint(id).await?;
    invalidate_endpoint_caches(&state, id).await?;
    state.scheduler().apply(ControlEvent::Delete(id)).await;
    Ok(StatusCode::NO_CONTENT)
}

// -- Monitoring logs --------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct MonitoringLogsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub hours: Option<u32>,
    pub endpoint_id: Option<Uuid>,
    pub success: Option<bool>,
}

pub async fn monitoring_logs(
    State(state): State<AppState>,
    Query(query): Query<MonitoringLogsQuery>,
) -> ApiResult<Json<Vec<ProbeResult>>> {
    let page = Page {
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(50).clamp(1, 500),
    };
    let filter = ProbeLogFilter {
        endpoint_id: query.endpoint_id,
        hours: query.hours,
        success: query.success,
    };
    let results = state.repository().list_probe_results(filter, page).await?;
    Ok(Json(results))
}

// -- Incidents ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub affected_endpoints: Vec<Uuid>,
    pub start: Option<DateTime<Utc>>,
}

pub async fn create_incident(
    State(state): State<AppState>,
    Json(payload): Json<CreateIncidentRequest>,
) -> ApiResult<(StatusCode, Json<Incident>)> {
    let now = Utc::now();
    let start = payload.start.unwrap_or(now);
    let incident = Incident {
        id: Uuid::new_v4(),
        title: payload.title,
        description: payload.description,
        severity: payload.severity,
        status: IncidentStatus::Open,
        origin: IncidentOrigin::Manual,
        created_by: None,
        start,
        end: None,
        created_at: now,
        updated_at: now,
    };
    incident.validate()?;

    let associations: Vec<EndpointIncident> = payload
        .affected_endpoints
        .iter()
        .map(|endpoint_id| EndpointIncident::open(*endpoint_id, incident.id, start))
        .collect();
    let created = state
        .repository()
        .create_manual_incident(incident, associations)
        .await?;
    state
        .cache()
        .delete_pattern(sentinel_cache::keys::incidents_prefix())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_incident(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Incident>> {
    let key = sentinel_cache::keys::incident(id);
    if let Some(cached) = state.cache().get_json::<Incident>(&key).await? {
        return Ok(Json(cached));
    }
    let incident = state.repository().get_incident(id).await?;
    state.cache().set_json(&key, &incident, ENDPOINT_CACHE_TTL).await?;
    Ok(Json(incident))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateIncidentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
    pub end: Option<DateTime<Utc>>,
}

pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateIncidentRequest>,
) -> ApiResult<Json<Incident>> {
    let mut incident = state.repository().get_incident(id).await?;
    if let Some(title) = payload.title {
        incident.title = title;
    }
    if payload.description.is_some() {
        incident.description = payload.description;
    }
    if let Some(severity) = payload.severity {
        incident.severity = severity;
    }
    if let Some(status) = payload.status {
        incident.status = status;
    }
    if payload.end.is_some() {
        incident.end = payload.end;
    }
    incident.updated_at = Utc::now();
    incident.validate()?;

    let updated = state.repository().update_incident(incident).await?;
    state.cache().delete(&sentinel_cache::keys::incident(id)).await?;
    state
        .cache()
        .delete_pattern(sentinel_cache::keys::incidents_prefix())
        .await?;
    Ok(Json(updated))
}

pub async fn delete_incident(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.repository().delete_incident(id).await?;
    state.cache().delete(&sentinel_cache::keys::incident(id)).await?;
    state
        .cache()
        .delete_pattern(sentinel_cache::keys::incidents_prefix())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Notification channels ---------------------------------------------------

pub async fn list_channels(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<NotificationChannelConfig>>> {
    Ok(Json(state.repository().list_channels().await?))
}

#[derive(Debug, Deserialize)]
pub struct UpsertChannelRequest {
    pub id: Option<Uuid>,
    pub channel_type: ChannelType,
    pub enabled: bool,
    pub settings: BTreeMap<String, String>,
}

pub async fn upsert_channel(
    State(state): State<AppState>,
    Json(payload): Json<UpsertChannelRequest>,
) -> ApiResult<Json<NotificationChannelConfig>> {
    let config = NotificationChannelConfig {
        id: payload.id.unwrap_or_else(Uuid::new_v4),
        channel_type: payload.channel_type,
        enabled: payload.enabled,
        settings: payload.settings,
    };
    let saved = state.repository().upsert_channel(config).await?;
    if saved.enabled {
        state.reconfigure_provider(&saved)?;
    }
    Ok(Json(saved))
}

pub async fn delete_channel(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.repository().delete_channel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /admin/notifications/history` — delivery attempts, newest first,
/// a narrow admin-only read.
pub async fn notification_history(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<DeliveryRecord>>> {
    let page = page_from(&query, 200);
    Ok(Json(state.repository().list_deliveries(page).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct TestNotificationRequest {
    /// Pin the test to a single provider; tests every enabled provider when
    /// omitted.
    pub channel_type: Option<ChannelType>,
}

/// `POST /admin/notifications/test` — dispatch a synthetic `Test` event
/// through the pinned provider, or every enabled provider when none is
/// pinned, recording a `DeliveryResult` for each exactly as a real
/// notification would.
pub async fn test_channel(
    State(state): State<AppState>,
    Json(payload): Json<TestNotificationRequest>,
) -> ApiResult<Json<Vec<DeliveryResult>>> {
    let event = NotificationEvent::new(
        NotificationKind::Test,
        "Test notification",
        "This is a test notification triggered from the admin console.",
    );

    let results: Vec<DeliveryResult> = match payload.channel_type {
        Some(channel) => {
            let provider = state
                .registry()
                .get(channel)
                .filter(|provider| provider.is_enabled())
                .ok_or_else(|| ApiError::NotFound {
                    kind: "notification channel",
                    id: format!("{channel:?}"),
                })?;
            let result = provider
                .send(&event)
                .await
                .unwrap_or_else(|e| DeliveryResult::err(channel, e.to_string()));
            vec![result]
        }
        None => {
            let cancel = CancellationToken::new();
            state
                .dispatcher()
                .send_to_all(state.registry(), &event, &cancel)
                .await
                .into_values()
                .collect()
        }
    };

    for result in &results {
        if let Err(e) = state
            .repository()
            .record_delivery(event.id, result.provider, result.clone())
            .await
        {
            warn!(event_id = %event.id, channel = ?result.provider, error = %e, "failed to record test delivery");
        }
    }

    Ok(Json(results))
}
