//! Request middleware: rate limiting, CSRF, and the baseline security
//! header set, each as an `axum::middleware::Next`-shaped function that
//! calls straight into the cache-backed guards.

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use sentinel_cache::csrf::{is_safe_method, TOKEN_TTL};
use sentinel_cache::rate_limit::{RateLimitDecision, RouteClass};
use sentinel_core::{Role, User};

use crate::error::ApiError;
use crate::state::AppState;

const CSP_HEADER: &str = "content-security-policy";
const NOSNIFF_HEADER: &str = "x-content-type-options";
const FRAME_OPTIONS_HEADER: &str = "x-frame-options";
const REFERRER_POLICY_HEADER: &str = "referrer-policy";
const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
const CSRF_COOKIE_NAME: &str = "csrf_token";
const CSRF_SKIP_HEADER: &str = "x-m2m";

/// Read a single cookie's value out of the request's `Cookie` header.
/// Deliberately minimal: this cookie is never `HttpOnly` and carries no
/// session state of its own, so there's nothing here that needs a full
/// cookie-jar parser.
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// The caller identity a rate-limit/CSRF decision is keyed on: the
/// authenticated user id if the gateway in front of this service has
/// already established one, otherwise the first hop in `X-Forwarded-For`.
pub(crate) fn client_subject(headers: &HeaderMap) -> String {
    if let Some(user_id) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        return format!("user:{user_id}");
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            return format!("ip:{}", first.trim());
        }
    }
    "ip:unknown".to_string()
}

async fn rate_limit_check(state: &AppState, headers: &HeaderMap, class: RouteClass) -> Result<(), ApiError> {
    let subject = client_subject(headers);
    match state.rate_limiter().check(&subject, class).await? {
        RateLimitDecision::Allow => Ok(()),
        RateLimitDecision::Reject { retry_after_secs } => Err(ApiError::RateLimited { retry_after_secs }),
    }
}

pub async fn public_rate_limit_mw(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    rate_limit_check(&state, &headers, RouteClass::Public).await?;
    Ok(next.run(request).await)
}

pub async fn auth_rate_limit_mw(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    rate_limit_check(&state, &headers, RouteClass::Auth).await?;
    Ok(next.run(request).await)
}

pub async fn general_rate_limit_mw(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    rate_limit_check(&state, &headers, RouteClass::General).await?;
    Ok(next.run(request).await)
}

/// Validate CSRF on unsafe methods: a trusted referer plus a double-submit
/// check that the `csrf_token` cookie and `X-CSRF-Token` header agree and
/// that the cache still remembers issuing that token. Machine-to-machine
/// callers (webhook receivers, health checks from an orchestrator) set
/// `X-M2M` to skip it.
pub async fn csrf_verify_mw(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_safe_method(request.method().as_str()) || headers.get(CSRF_SKIP_HEADER).is_some() {
        return Ok(next.run(request).await);
    }

    let referer = headers
        .get(axum::http::header::REFERER)
        .and_then(|v| v.to_str().ok());
    if !state.csrf().referer_is_trusted(referer) {
        warn!("csrf: untrusted referer rejected");
        return Err(ApiError::Forbidden("untrusted origin".into()));
    }

    let header_token = headers
        .get(CSRF_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let cookie_token = read_cookie(&headers, CSRF_COOKIE_NAME).unwrap_or_default();
    if !state.csrf().validate(&cookie_token, header_token).await? {
        return Err(ApiError::Forbidden("missing or invalid csrf token".into()));
    }

    Ok(next.run(request).await)
}

/// Issue a fresh CSRF token on every safe-method response, delivered both
/// as a response header and as a non-`HttpOnly` cookie (a GET is how a
/// client first learns the token it must echo back on the header for the
/// double-submit check in `csrf_verify_mw`).
pub async fn csrf_issue_mw(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let safe = is_safe_method(request.method().as_str());
    let mut response = next.run(request).await;
    if safe {
        if let Ok(token) = state.csrf().issue().await {
            if let Ok(value) = HeaderValue::from_str(&token) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(CSRF_TOKEN_HEADER), value);
            }
            let cookie = format!(
                "{CSRF_COOKIE_NAME}={token}; Path=/; Max-Age={}; SameSite=Lax",
                TOKEN_TTL.as_secs()
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
    }
    response
}

/// Require the caller to resolve (via the same `x-user-id` header
/// `auth::me` trusts) to a user with the `Admin` role. Rejects with 401 if
/// no identity is presented, 403 if it resolves to a non-admin.
pub async fn admin_role_mw(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let email = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let user = state
        .repository()
        .get_user_by_email(&User::normalize_email(email))
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    if user.role != Role::Admin {
        return Err(ApiError::Forbidden("admin role required".into()));
    }
    Ok(next.run(request).await)
}

/// Attach the baseline security header set to every response.
pub async fn security_headers_mw(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(csp) = HeaderValue::from_str(&state.config().security.csp_policy) {
        headers.insert(HeaderName::from_static(CSP_HEADER), csp);
    }
    headers.insert(HeaderName::from_static(NOSNIFF_HEADER), HeaderValue::from_static("nosniff"));
    headers.insert(HeaderName::from_static(FRAME_OPTIONS_HEADER), HeaderValue::from_static("DENY"));
    headers.insert(
        HeaderName::from_static(REFERRER_POLICY_HEADER),
        HeaderValue::from_static("no-referrer"),
    );
    response.into_response()
}
