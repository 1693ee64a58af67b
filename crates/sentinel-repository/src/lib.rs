//! Persistence contract for sentinel entities.
//!
//! The core never depends on a particular relational engine; it talks to
//! this trait. `memory` provides an in-memory implementation suitable for
//! tests and single-process development; a production deployment backs the
//! same trait with a real database (schema evolution for that lives in an
//! out-of-core migration tool).

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{
    ChannelType, DeliveryResult, Endpoint, EndpointIncident, Incident, NotificationChannelConfig,
    ProbeResult, UptimeStats, User,
};
use uuid::Uuid;

pub use error::{RepoError, RepoResult};

/// Filters accepted by monitoring log queries.
#[derive(Debug, Clone, Default)]
pub struct ProbeLogFilter {
    pub endpoint_id: Option<Uuid>,
    pub hours: Option<u32>,
    pub success: Option<bool>,
}

/// A single persisted delivery attempt, returned by `list_deliveries` for
/// `GET /admin/notifications/history`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveryRecord {
    pub event_id: Uuid,
    pub result: DeliveryResult,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    // -- Endpoints ---------------------------------------------------
    async fn create_endpoint(&self, endpoint: Endpoint) -> RepoResult<Endpoint>;
    async fn update_endpoint(&self, endpoint: Endpoint) -> RepoResult<Endpoint>;
    async fn delete_endpoint(&self, id: Uuid) -> RepoResult<()>;
    async fn get_endpoint(&self, id: Uuid) -> RepoResult<Endpoint>;
    async fn list_endpoints(&self, enabled_only: bool, page: Page) -> RepoResult<Vec<Endpoint>>;
    async fn list_all_enabled_endpoints(&self) -> RepoResult<Vec<Endpoint>>;

    // -- Probe results -------------------------------------------------
    async fn insert_probe_result(&self, result: ProbeResult) -> RepoResult<ProbeResult>;
    async fn list_probe_results(
        &self,
        filter: ProbeLogFilter,
        page: Page,
    ) -> RepoResult<Vec<ProbeResult>>;
    async fn recent_probe_results(&self, endpoint_id: Uuid, n: usize) -> RepoResult<Vec<ProbeResult>>;
    async fn uptime_stats(&self, endpoint_id: Uuid, days: u32) -> RepoResult<UptimeStats>;
    /// Delete probe results older than `older_than`; returns count deleted.
    async fn prune_probe_results(&self, older_than: DateTime<Utc>) -> RepoResult<u64>;

    // -- Incidents -------------------------------------------------------
    async fn get_incident(&self, id: Uuid) -> RepoResult<Incident>;
    async fn update_incident(&self, incident: Incident) -> RepoResult<Incident>;
    async fn create_manual_incident(
        &self,
        incident: Incident,
        affected: Vec<EndpointIncident>,
    ) -> RepoResult<Incident>;
    async fn list_incidents(&self, page: Page) -> RepoResult<Vec<Incident>>;
    async fn delete_incident(&self, id: Uuid) -> RepoResult<()>;
    async fn list_incidents_overlapping(
        &self,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> RepoResult<Vec<Incident>>;

    /// Atomically open an auto-incident for `endpoint_id` iff none is
    /// currently open; returns `Conflict` if one already is.
    async fn try_open_auto_incident(
        &self,
        endpoint_id: Uuid,
        incident: Incident,
        association: EndpointIncident,
    ) -> RepoResult<Incident>;

    /// Resolve the open auto-incident for `endpoint_id`, if any; returns the
    /// resolved incident, or `NotFound` if there was none open.
    async fn resolve_open_auto_incident(
        &self,
        endpoint_id: Uuid,
        at: DateTime<Utc>,
    ) -> RepoResult<Incident>;

    // -- Users -------------------------------------------------------------
    async fn create_user(&self, user: User) -> RepoResult<User>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn count_users(&self) -> RepoResult<u64>;

    // -- Notification channels --------------------------------------------
    async fn upsert_channel(&self, config: NotificationChannelConfig) -> RepoResult<NotificationChannelConfig>;
    async fn delete_channel(&self, id: Uuid) -> RepoResult<()>;
    async fn list_channels(&self) -> RepoResult<Vec<NotificationChannelConfig>>;
    async fn record_delivery(
        &self,
        event_id: Uuid,
        provider: ChannelType,
        result: DeliveryResult,
    ) -> RepoResult<()>;
    /// `GET /admin/notifications/history`, newest first.
    async fn list_deliveries(&self, page: Page) -> RepoResult<Vec<DeliveryRecord>>;

    // -- Health --------------------------------------------------------------
    /// Cheap liveness probe used by `/health/ready`.
    async fn ping(&self) -> RepoResult<()>;
}
