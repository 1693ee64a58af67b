//! Probe result entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The immutable outcome of a single probe attempt (after retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub status: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn success(endpoint_id: Uuid, status: u16, response_time_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            attempted_at: Utc::now(),
            success: true,
            status: Some(status),
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn failure(endpoint_id: Uuid, status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            attempted_at: Utc::now(),
            success: false,
            status,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Rolling uptime statistics over a window, derived from stored probe results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UptimeStats {
    /// Uptime percentage, `100.0` when no checks have been recorded.
    pub percentage: f64,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl UptimeStats {
    pub fn new(
        total_checks: u64,
        successful_checks: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        let percentage = if total_checks == 0 {
            100.0
        } else {
            (successful_checks as f64 / total_checks as f64) * 100.0
        };
        Self {
            percentage,
            total_checks,
            successful_checks,
            window_start,
            window_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_with_no_checks_is_full() {
        let now = Utc::now();
        let stats = UptimeStats::new(0, 0, now, now);
        assert_eq!(stats.percentage, 100.0);
    }

    #[test]
    fn percentage_divides_correctly() {
        let now = Utc::now();
        let stats = UptimeStats::new(4, 3, now, now);
        assert_eq!(stats.percentage, 75.0);
    }
}
