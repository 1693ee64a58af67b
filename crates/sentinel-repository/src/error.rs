//! Repository error type.

use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("core validation failed: {0}")]
    Invalid(#[from] sentinel_core::CoreError),
}
