//! Unified API error type: `ApiError{code, message, details}`, with the
//! HTTP mapping done directly via `IntoResponse` rather than a side-table
//! match on a code string.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("unauthenticated")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error("internal error, correlation id {correlation_id}")]
    Internal { correlation_id: Uuid },
}

impl ApiError {
    /// Wrap an opaque internal failure: the detail is logged with a
    /// correlation id, never placed in the response body.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        error!(%correlation_id, error = %detail, "internal error");
        ApiError::Internal { correlation_id }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Dependency(_) => "DEPENDENCY_UNAVAILABLE",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the response body. Internal errors never
    /// surface their detail, only the correlation id.
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal { correlation_id } => {
                format!("internal error, reference {correlation_id}")
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<sentinel_core::CoreError> for ApiError {
    fn from(err: sentinel_core::CoreError) -> Self {
        use sentinel_core::CoreError::*;
        match err {
            Validation { field, reason } => ApiError::Validation { field, reason },
            InvariantViolation(msg) => ApiError::Conflict(msg),
            NotFound { kind, id } => ApiError::NotFound { kind, id },
            Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

impl From<sentinel_repository::RepoError> for ApiError {
    fn from(err: sentinel_repository::RepoError) -> Self {
        use sentinel_repository::RepoError::*;
        match err {
            NotFound { kind, id } => ApiError::NotFound { kind, id },
            Conflict(msg) => ApiError::Conflict(msg),
            Unavailable(msg) => ApiError::Dependency(msg),
            Invalid(core_err) => core_err.into(),
        }
    }
}

impl From<sentinel_cache::CacheError> for ApiError {
    fn from(err: sentinel_cache::CacheError) -> Self {
        ApiError::Dependency(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
