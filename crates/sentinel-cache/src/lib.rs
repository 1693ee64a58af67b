//! Uniform key/value cache abstraction, plus the rate limiter and CSRF
//! token store built on top of it.

pub mod csrf;
pub mod memory;
pub mod noop;
pub mod rate_limit;
pub mod remote;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("failed to decode cached value: {0}")]
    Decode(String),
}

/// Outcome of a `Get`: hit with bytes, miss, or a decode failure on an
/// otherwise-present value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetOutcome {
    Hit(Vec<u8>),
    Miss,
}

/// A uniform key/value store. Implementations must be safe for concurrent
/// multi-writer use.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
    async fn get(&self, key: &str) -> CacheResult<GetOutcome>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
    /// Remove all keys sharing the given prefix (`DeletePattern`; canonical
    /// keys are colon-delimited prefixes).
    async fn delete_pattern(&self, prefix: &str) -> CacheResult<()>;
    async fn exists(&self, key: &str) -> CacheResult<bool>;
    /// Atomic "set if absent"; returns whether the value was set.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<bool>;
    /// Atomic increment; if absent, creates the counter at 1 with the
    /// default TTL (1 hour).
    async fn increment(&self, key: &str) -> CacheResult<i64>;
    /// As `increment`, but resets the TTL to `ttl` on every call.
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> CacheResult<i64>;
}

/// Default TTL applied by `increment` when it creates a new counter.
pub const DEFAULT_COUNTER_TTL: Duration = Duration::from_secs(3600);

/// Convenience helpers for typed (JSON) get/set, layered over the raw byte
/// contract so callers don't each reimplement (de)serialization.
#[async_trait]
pub trait TypedCache: Cache {
    async fn set_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Backend(e.to_string()))?;
        self.set(key, bytes, ttl).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await? {
            GetOutcome::Hit(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Decode(e.to_string()))?;
                Ok(Some(value))
            }
            GetOutcome::Miss => Ok(None),
        }
    }
}

impl<T: Cache + ?Sized> TypedCache for T {}

/// Canonical cache key builders, so call sites can't typo a key family.
pub mod keys {
    use uuid::Uuid;

    pub fn endpoint(id: Uuid) -> String {
        format!("endpoint:{id}")
    }

    pub fn endpoints_page(page: u32, limit: u32, enabled: bool) -> String {
        format!("endpoints:page:{page}:limit:{limit}:enabled:{enabled}")
    }

    pub fn endpoints_prefix() -> &'static str {
        "endpoints:"
    }

    pub fn monitoring_logs(
        page: u32,
        limit: u32,
        hours: u32,
        endpoint_id: Uuid,
        success: bool,
    ) -> String {
        format!(
            "monitoring_logs:page:{page}:limit:{limit}:hours:{hours}:endpoint:{endpoint_id}:success:{success}"
        )
    }

    pub fn monitoring_logs_prefix() -> &'static str {
        "monitoring_logs:"
    }

    pub fn incident(id: Uuid) -> String {
        format!("incident:{id}")
    }

    pub fn incidents_prefix() -> &'static str {
        "incidents:"
    }

    pub fn uptime_stats(id: Uuid, days: u32) -> String {
        format!("uptime_stats:{id}:days:{days}")
    }

    pub fn uptime_stats_prefix(id: Uuid) -> String {
        format!("uptime_stats:{id}:")
    }

    pub fn rate_limit(subject: &str, scope: &str) -> String {
        format!("rate_limit:{subject}:{scope}")
    }

    pub fn session(id: &str) -> String {
        format!("session:{id}")
    }

    pub fn csrf_token(token: &str) -> String {
        format!("csrf:token:{token}")
    }
}
