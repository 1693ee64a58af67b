//! Auth surface, kept deliberately thin: these handlers register the
//! first admin, verify credentials, and echo back the caller's identity,
//! nothing more (no session store, no JWT signer — that belongs to an
//! upstream identity provider).

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use sentinel_core::{Role, User};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password_verifier: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: uuid::Uuid,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

/// `POST /auth/register` — only ever succeeds once, for the first admin.
/// Every subsequent attempt is a 403: this deployment already has an owner
/// and user provisioning moves to the collaborator this crate doesn't
/// implement.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    if state.repository().count_users().await? > 0 {
        return Err(ApiError::Forbidden(
            "registration is closed after the first admin account".into(),
        ));
    }
    let user = User::new_first_admin(&payload.email, payload.password_verifier);
    user.validate()?;
    let created = state.repository().create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[derive(Debug, Serialize)]
pub struct RegistrationStatus {
    pub allowed: bool,
}

/// `GET /auth/registration-status` — lets a fresh deployment's frontend know
/// whether to show the initial-setup screen.
pub async fn registration_status(State(state): State<AppState>) -> ApiResult<Json<RegistrationStatus>> {
    let allowed = state.repository().count_users().await? == 0;
    Ok(Json(RegistrationStatus { allowed }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password_verifier: String,
}

/// Constant-time comparison so a mistyped verifier can't be distinguished
/// from a wrong one by timing, matching the pattern `CsrfGuard` uses for
/// token comparison.
fn verifiers_match(submitted: &str, stored: &str) -> bool {
    submitted.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// `POST /auth/login` — verifies credentials and hands back the caller's
/// identity; session/JWT issuance is the external collaborator's job.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<UserView>> {
    let normalized = User::normalize_email(&payload.email);
    let user = state
        .repository()
        .get_user_by_email(&normalized)
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    if !verifiers_match(&payload.password_verifier, &user.password_verifier) {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(user.into()))
}

/// `POST /auth/logout` — stateless on this side; nothing to revoke once the
/// session/JWT lives upstream.
pub async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `GET /auth/me` — resolves the caller identity via the `x-user-id` header
/// an upstream gateway is expected to attach after minting its own session;
/// token minting itself stays an external collaborator.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<UserView>> {
    let email = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let user = state
        .repository()
        .get_user_by_email(&User::normalize_email(email))
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    Ok(Json(user.into()))
}
