//! Incident entity and endpoint association.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentOrigin {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub origin: IncidentOrigin,
    pub created_by: Option<Uuid>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(end) = self.end {
            if end < self.start {
                return Err(CoreError::Validation {
                    field: "end".into(),
                    reason: "must be at or after start".into(),
                });
            }
        }
        Ok(())
    }

    pub fn is_open_auto(&self) -> bool {
        self.origin == IncidentOrigin::Auto && self.status != IncidentStatus::Resolved
    }

    /// Open a new automatic incident for a down transition.
    pub fn open_auto(endpoint_name: &str, critical: bool, start: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: format!("{endpoint_name} is down"),
            description: None,
            severity: if critical {
                Severity::Critical
            } else {
                Severity::High
            },
            status: IncidentStatus::Investigating,
            origin: IncidentOrigin::Auto,
            created_by: None,
            start,
            end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve this incident on an observed `down -> up` transition.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.status = IncidentStatus::Resolved;
        self.end = Some(at);
        self.updated_at = Utc::now();
    }
}

/// Association between an endpoint and an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointIncident {
    pub endpoint_id: Uuid,
    pub incident_id: Uuid,
    pub affected_start: DateTime<Utc>,
    pub affected_end: Option<DateTime<Utc>>,
}

impl EndpointIncident {
    pub fn open(endpoint_id: Uuid, incident_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            endpoint_id,
            incident_id,
            affected_start: at,
            affected_end: None,
        }
    }

    /// Close this association; errors if it is already closed (closing
    /// requires an open association).
    pub fn close(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.affected_end.is_some() {
            return Err(CoreError::Conflict(
                "endpoint-incident association already closed".into(),
            ));
        }
        self.affected_end = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_before_start_is_rejected() {
        let now = Utc::now();
        let incident = Incident {
            id: Uuid::new_v4(),
            title: "x".into(),
            description: None,
            severity: Severity::High,
            status: IncidentStatus::Open,
            origin: IncidentOrigin::Manual,
            created_by: None,
            start: now,
            end: Some(now - chrono::Duration::seconds(1)),
            created_at: now,
            updated_at: now,
        };
        assert!(incident.validate().is_err());
    }

    #[test]
    fn auto_open_uses_critical_severity_for_critical_endpoints() {
        let incident = Incident::open_auto("api", true, Utc::now());
        assert_eq!(incident.severity, Severity::Critical);
        assert_eq!(incident.origin, IncidentOrigin::Auto);
        assert!(incident.is_open_auto());
    }

    #[test]
    fn resolve_closes_open_auto_incident() {
        let mut incident = Incident::open_auto("api", false, Utc::now());
        incident.resolve(Utc::now());
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert!(!incident.is_open_auto());
    }

    #[test]
    fn association_cannot_be_closed_twice() {
        let mut assoc = EndpointIncident::open(Uuid::new_v4(), Uuid::new_v4(), Utc::now());
        assoc.close(Utc::now()).unwrap();
        assert!(assoc.close(Utc::now()).is_err());
    }
}
