//! In-memory `Repository` implementation for tests and single-process
//! development deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{
    ChannelType, DeliveryResult, Endpoint, EndpointIncident, Incident, IncidentOrigin,
    NotificationChannelConfig, ProbeResult, UptimeStats, User,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RepoError, RepoResult};
use crate::{DeliveryRecord, Page, ProbeLogFilter, Repository};

#[derive(Default)]
struct Inner {
    endpoints: HashMap<Uuid, Endpoint>,
    probes: Vec<ProbeResult>,
    incidents: HashMap<Uuid, Incident>,
    associations: Vec<EndpointIncident>,
    users: HashMap<Uuid, User>,
    channels: HashMap<Uuid, NotificationChannelConfig>,
    deliveries: Vec<(Uuid, ChannelType, DeliveryResult)>,
}

/// A `Repository` backed by an in-process `RwLock<Inner>`. Single-writer per
/// endpoint is assumed at the engine level ;
/// this lock only serializes the bookkeeping operations themselves.
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(kind: &'static str, id: Uuid) -> RepoError {
    RepoError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_endpoint(&self, endpoint: Endpoint) -> RepoResult<Endpoint> {
        endpoint.validate()?;
        let mut inner = self.inner.write().await;
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(&self, mut endpoint: Endpoint) -> RepoResult<Endpoint> {
        endpoint.validate()?;
        endpoint.updated_at = Utc::now();
        let mut inner = self.inner.write().await;
        if !inner.endpoints.contains_key(&endpoint.id) {
            return Err(not_found("endpoint", endpoint.id));
        }
        inner.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn delete_endpoint(&self, id: Uuid) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        if inner.endpoints.remove(&id).is_none() {
            return Err(not_found("endpoint", id));
        }
        inner.probes.retain(|p| p.endpoint_id != id);
        inner.associations.retain(|a| a.endpoint_id != id);
        Ok(())
    }

    async fn get_endpoint(&self, id: Uuid) -> RepoResult<Endpoint> {
        let inner = self.inner.read().await;
        inner
            .endpoints
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("endpoint", id))
    }

    async fn list_endpoints(&self, enabled_only: bool, page: Page) -> RepoResult<Vec<Endpoint>> {
        let inner = self.inner.read().await;
        let mut items: Vec<Endpoint> = inner
            .endpoints
            .values()
            .filter(|e| !enabled_only || e.enabled)
            .cloned()
            .collect();
        items.sort_by_key(|e| e.id);
        Ok(paginate(items, page))
    }

    async fn list_all_enabled_endpoints(&self) -> RepoResult<Vec<Endpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.endpoints.values().filter(|e| e.enabled).cloned().collect())
    }

    async fn insert_probe_result(&self, result: ProbeResult) -> RepoResult<ProbeResult> {
        let mut inner = self.inner.write().await;
        inner.probes.push(result.clone());
        Ok(result)
    }

    async fn list_probe_results(
        &self,
        filter: ProbeLogFilter,
        page: Page,
    ) -> RepoResult<Vec<ProbeResult>> {
        let inner = self.inner.read().await;
        let cutoff = filter
            .hours
            .map(|h| Utc::now() - chrono::Duration::hours(h as i64));
        let mut items: Vec<ProbeResult> = inner
            .probes
            .iter()
            .filter(|p| filter.endpoint_id.map_or(true, |id| p.endpoint_id == id))
            .filter(|p| filter.success.map_or(true, |s| p.success == s))
            .filter(|p| cutoff.map_or(true, |c| p.attempted_at >= c))
            .cloned()
            .collect();
        items.sort_by_key(|p| std::cmp::Reverse(p.attempted_at));
        Ok(paginate(items, page))
    }

    async fn recent_probe_results(&self, endpoint_id: Uuid, n: usize) -> RepoResult<Vec<ProbeResult>> {
        let inner = self.inner.read().await;
        let mut items: Vec<ProbeResult> = inner
            .probes
            .iter()
            .filter(|p| p.endpoint_id == endpoint_id)
            .cloned()
            .collect();
        items.sort_by_key(|p| p.attempted_at);
        if items.len() > n {
            items = items.split_off(items.len() - n);
        }
        Ok(items)
    }

    async fn uptime_stats(&self, endpoint_id: Uuid, days: u32) -> RepoResult<UptimeStats> {
        let inner = self.inner.read().await;
        let window_end = Utc::now();
        let window_start = window_end - chrono::Duration::days(days as i64);
        let relevant: Vec<&ProbeResult> = inner
            .probes
            .iter()
            .filter(|p| p.endpoint_id == endpoint_id && p.attempted_at >= window_start)
            .collect();
        let total = relevant.len() as u64;
        let successful = relevant.iter().filter(|p| p.success).count() as u64;
        Ok(UptimeStats::new(total, successful, window_start, window_end))
    }

    async fn prune_probe_results(&self, older_than: DateTime<Utc>) -> RepoResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.probes.len();
        inner.probes.retain(|p| p.attempted_at >= older_than);
        Ok((before - inner.probes.len()) as u64)
    }

    async fn get_incident(&self, id: Uuid) -> RepoResult<Incident> {
        let inner = self.inner.read().await;
        inner
            .incidents
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("incident", id))
    }

    async fn update_incident(&self, mut incident: Incident) -> RepoResult<Incident> {
        incident.validate()?;
        incident.updated_at = Utc::now();
        let mut inner = self.inner.write().await;
        if !inner.incidents.contains_key(&incident.id) {
            return Err(not_found("incident", incident.id));
        }
        inner.incidents.insert(incident.id, incident.clone());
        Ok(incident)
    }

    async fn create_manual_incident(
        &self,
        incident: Incident,
        affected: Vec<EndpointIncident>,
    ) -> RepoResult<Incident> {
        incident.validate()?;
        let mut inner = self.inner.write().await;
        inner.incidents.insert(incident.id, incident.clone());
        inner.associations.extend(affected);
        Ok(incident)
    }

    async fn list_incidents(&self, page: Page) -> RepoResult<Vec<Incident>> {
        let inner = self.inner.read().await;
        let mut items: Vec<Incident> = inner.incidents.values().cloned().collect();
        items.sort_by_key(|i| std::cmp::Reverse(i.start));
        Ok(paginate(items, page))
    }

    async fn delete_incident(&self, id: Uuid) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        if inner.incidents.remove(&id).is_none() {
            return Err(not_found("incident", id));
        }
        inner.associations.retain(|a| a.incident_id != id);
        Ok(())
    }

    async fn list_incidents_overlapping(
        &self,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> RepoResult<Vec<Incident>> {
        let inner = self.inner.read().await;
        Ok(inner
            .incidents
            .values()
            .filter(|i| i.start < day_end && i.end.map_or(true, |e| e >= day_start))
            .cloned()
            .collect())
    }

    async fn try_open_auto_incident(
        &self,
        endpoint_id: Uuid,
        incident: Incident,
        association: EndpointIncident,
    ) -> RepoResult<Incident> {
        let mut inner = self.inner.write().await;
        let already_open = inner.associations.iter().any(|a| {
            a.endpoint_id == endpoint_id
                && a.affected_end.is_none()
                && inner
                    .incidents
                    .get(&a.incident_id)
                    .is_some_and(|i| i.origin == IncidentOrigin::Auto && i.is_open_auto())
        });
        if already_open {
            return Err(RepoError::Conflict(format!(
                "endpoint {endpoint_id} already has an open auto-incident"
            )));
        }
        inner.incidents.insert(incident.id, incident.clone());
        inner.associations.push(association);
        Ok(incident)
    }

    async fn resolve_open_auto_incident(
        &self,
        endpoint_id: Uuid,
        at: DateTime<Utc>,
    ) -> RepoResult<Incident> {
        let mut inner = self.inner.write().await;
        let assoc_idx = inner
            .associations
            .iter()
            .position(|a| {
                a.endpoint_id == endpoint_id
                    && a.affected_end.is_none()
                    && inner
                        .incidents
                        .get(&a.incident_id)
                        .is_some_and(|i| i.origin == IncidentOrigin::Auto && i.is_open_auto())
            })
            .ok_or_else(|| {
                RepoError::NotFound {
                    kind: "open auto-incident for endpoint",
                    id: endpoint_id.to_string(),
                }
            })?;

        let incident_id = inner.associations[assoc_idx].incident_id;
        inner.associations[assoc_idx]
            .close(at)
            .map_err(RepoError::Invalid)?;

        let incident = inner
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| not_found("incident", incident_id))?;
        incident.resolve(at);
        Ok(incident.clone())
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        user.validate()?;
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
        let normalized = User::normalize_email(email);
        let inner = self.inner.read().await;
        inner
            .users
            .values()
            .find(|u| u.email == normalized)
            .cloned()
            .ok_or_else(|| RepoError::NotFound {
                kind: "user",
                id: normalized,
            })
    }

    async fn count_users(&self) -> RepoResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.len() as u64)
    }

    async fn upsert_channel(
        &self,
        config: NotificationChannelConfig,
    ) -> RepoResult<NotificationChannelConfig> {
        let mut inner = self.inner.write().await;
        inner.channels.insert(config.id, config.clone());
        Ok(config)
    }

    async fn delete_channel(&self, id: Uuid) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .channels
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("notification channel", id))
    }

    async fn list_channels(&self) -> RepoResult<Vec<NotificationChannelConfig>> {
        let inner = self.inner.read().await;
        Ok(inner.channels.values().cloned().collect())
    }

    async fn record_delivery(
        &self,
        event_id: Uuid,
        provider: ChannelType,
        result: DeliveryResult,
    ) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        inner.deliveries.push((event_id, provider, result));
        Ok(())
    }

    async fn list_deliveries(&self, page: Page) -> RepoResult<Vec<DeliveryRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<DeliveryRecord> = inner
            .deliveries
            .iter()
            .map(|(event_id, _provider, result)| DeliveryRecord {
                event_id: *event_id,
                result: result.clone(),
            })
            .collect();
        records.reverse();
        Ok(paginate(records, page))
    }

    async fn ping(&self) -> RepoResult<()> {
        let _ = self.inner.read().await;
        Ok(())
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    let offset = page.offset() as usize;
    if offset >= items.len() {
        return Vec::new();
    }
    let end = (offset + page.limit as usize).min(items.len());
    items[offset..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::HttpMethod;
    use std::collections::BTreeMap;

    fn sample_endpoint() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: Uuid::new_v4(),
            name: "api".into(),
            description: None,
            url: "https://api.example.com".into(),
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

    #[tokio::test]
    async fn create_read_update_delete_roundtrip() {
        let repo = InMemoryRepository::new();
        let endpoint = sample_endpoint();
        let created = repo.create_endpoint(endpoint.clone()).await.unwrap();
        assert_eq!(created.id, endpoint.id);

        let fetched = repo.get_endpoint(endpoint.id).await.unwrap();
        assert_eq!(fetched.name, "api");

        let mut updated = fetched;
        updated.name = "api-v2".into();
        repo.update_endpoint(updated).await.unwrap();
        assert_eq!(repo.get_endpoint(endpoint.id).await.unwrap().name, "api-v2");

        repo.delete_endpoint(endpoint.id).await.unwrap();
        assert!(repo.get_endpoint(endpoint.id).await.is_err());
    }

    #[tokio::test]
    async fn at_most_one_open_auto_incident_per_endpoint() {
        let repo = InMemoryRepository::new();
        let endpoint_id = Uuid::new_v4();
        let incident1 = Incident::open_auto("api", false, Utc::now());
        let assoc1 = EndpointIncident::open(endpoint_id, incident1.id, Utc::now());
        repo.try_open_auto_incident(endpoint_id, incident1, assoc1)
            .await
            .unwrap();

        let incident2 = Incident::open_auto("api", false, Utc::now());
        let assoc2 = EndpointIncident::open(endpoint_id, incident2.id, Utc::now());
        let result = repo.try_open_auto_incident(endpoint_id, incident2, assoc2).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn resolve_requires_an_open_incident() {
        let repo = InMemoryRepository::new();
        let endpoint_id = Uuid::new_v4();
        let result = repo.resolve_open_auto_incident(endpoint_id, Utc::now()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registration_lockdown_via_count() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.count_users().await.unwrap(), 0);
        let user = User::new_first_admin("a@x.com", "verifier");
        repo.create_user(user).await.unwrap();
        assert_eq!(repo.count_users().await.unwrap(), 1);
    }
}
