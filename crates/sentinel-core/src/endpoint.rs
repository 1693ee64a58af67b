//! Endpoint entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Minimum allowed probe interval, in seconds.
pub const MIN_INTERVAL_SECS: u32 = 60;
/// Maximum allowed probe interval, in seconds.
pub const MAX_INTERVAL_SECS: u32 = 86_400;
/// Global cap on configured retry attempts, regardless of per-endpoint config.
pub const MAX_RETRY_ATTEMPTS_CAP: u8 = 10;

/// HTTP methods an endpoint may be probed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

/// A monitored HTTP(S) endpoint and its probe configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub expected_status: Vec<u16>,
    pub max_retry_attempts: u8,
    pub retry_backoff_secs: u32,
    /// Severity is escalated to `critical` for these endpoints on auto-open.
    pub critical: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Default expected status range (HTTP 2xx).
    pub fn default_expected_status() -> Vec<u16> {
        (200..300).collect()
    }

    /// Validate field invariants: URL scheme, interval, timeout, retries.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        let scheme_ok = self.url.starts_with("http://") || self.url.starts_with("https://");
        if !scheme_ok {
            return Err(CoreError::Validation {
                field: "url".into(),
                reason: "must use http or https".into(),
            });
        }
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_secs) {
            return Err(CoreError::Validation {
                field: "interval_secs".into(),
                reason: format!(
                    "must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS} seconds"
                ),
            });
        }
        if !(1..=120).contains(&self.timeout_secs) {
            return Err(CoreError::Validation {
                field: "timeout_secs".into(),
                reason: "must be between 1 and 120 seconds".into(),
            });
        }
        if self.max_retry_attempts > MAX_RETRY_ATTEMPTS_CAP {
            return Err(CoreError::Validation {
                field: "max_retry_attempts".into(),
                reason: format!("must not exceed the global cap of {MAX_RETRY_ATTEMPTS_CAP}"),
            });
        }
        for (key, value) in &self.headers {
            if value.contains('\r') || value.contains('\n') {
                return Err(CoreError::Validation {
                    field: format!("headers.{key}"),
                    reason: "must not contain CR or LF".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: Uuid::new_v4(),
            name: "api".into(),
            description: None,
            url: "https://api.example.com/health".into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            interval_secs: 60,
            timeout_secs: 5,
            expected_status: Endpoint::default_expected_status(),
            max_retry_attempts: 2,
            retry_backoff_secs: 1,
            critical: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejects_interval_below_minimum() {
        let mut e = sample();
        e.interval_secs = 30;
        assert!(matches!(
            e.validate(),
            Err(CoreError::Validation { field, .. }) if field == "interval_secs"
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let mut e = sample();
        e.url = "ftp://example.com".into();
        assert!(e.validate().is_err());
    }

    #[test]
    fn rejects_header_with_crlf() {
        let mut e = sample();
        e.headers.insert("X-Inject".into(), "value\r\nSet-Cookie: x".into());
        assert!(e.validate().is_err());
    }

    #[test]
    fn accepts_valid_endpoint() {
        assert!(sample().validate().is_ok());
    }
}
