//! Thin `axum` HTTP surface over the sentinel core: a plain `Router<S>`
//! builder over an `Arc`-backed state handle, with `ServiceBuilder`
//! layering (`CorsLayer`, `TraceLayer`) plus the cache-backed rate-limit
//! and CSRF guards from `middleware.rs` wired in as
//! `axum::middleware::from_fn_with_state`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    admin_role_mw, auth_rate_limit_mw, csrf_issue_mw, csrf_verify_mw, general_rate_limit_mw,
    public_rate_limit_mw, security_headers_mw,
};
use crate::state::AppState;

fn public_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/status", get(routes::public::status))
        .route("/uptime/:endpoint_id", get(routes::public::uptime))
        .route("/incidents", get(routes::public::incidents))
        .route("/incidents/:date", get(routes::public::incidents_by_date))
        .route("/events", get(routes::sse::events))
        .layer(axum::middleware::from_fn_with_state(state.clone(), public_rate_limit_mw))
}

fn health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/health/live", get(routes::health::live))
        .route("/health/ready", get(routes::health::ready))
}

fn auth_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/registration-status", get(routes::auth::registration_status))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .layer(axum::middleware::from_fn_with_state(state.clone(), csrf_verify_mw))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_rate_limit_mw))
}

fn admin_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/admin/endpoints",
            get(routes::admin::list_endpoints).post(routes::admin::create_endpoint),
        )
        .route(
            "/admin/endpoints/:id",
            get(routes::admin::get_endpoint)
                .put(routes::admin::update_endpoint)
                .delete(routes::admin::delete_endpoint),
        )
        .route("/admin/monitoring-logs", get(routes::admin::monitoring_logs))
        .route("/admin/incidents", post(routes::admin::create_incident))
        .route(
            "/admin/incidents/:id",
            get(routes::admin::get_incident)
                .put(routes::admin::update_incident)
                .delete(routes::admin::delete_incident),
        )
        .route(
            "/admin/notifications/channels",
            get(routes::admin::list_channels).post(routes::admin::upsert_channel),
        )
        .route("/admin/notifications/channels/:id", axum::routing::delete(routes::admin::delete_channel))
        .route("/admin/notifications/history", get(routes::admin::notification_history))
        .route("/admin/notifications/test", post(routes::admin::test_channel))
        .route("/admin/metrics", get(routes::metrics::metrics))
        .layer(axum::middleware::from_fn_with_state(state.clone(), csrf_verify_mw))
        .layer(axum::middleware::from_fn_with_state(state.clone(), admin_role_mw))
        .layer(axum::middleware::from_fn_with_state(state.clone(), general_rate_limit_mw))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config().cors.allowed_origins;
    let allow_origin = if origins.iter().any(|o| o.as_str() == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Build the full router. Every surface gets the same baseline layers
/// (security headers, CSRF token issuance on safe methods, CORS, request
/// tracing); route-class-specific rate limiting and CSRF verification are
/// layered per sub-router above.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .merge(public_router(&state))
        .merge(health_router())
        .merge(auth_router(&state))
        .merge(admin_router(&state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn_with_state(state.clone(), csrf_issue_mw))
                .layer(axum::middleware::from_fn_with_state(state.clone(), security_headers_mw)),
        )
        .with_state(state)
}
