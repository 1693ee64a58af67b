//! Notification domain types shared between the engine, the pipeline, and
//! the admin HTTP surface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::incident::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Email,
    Slack,
    Discord,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannelConfig {
    pub id: Uuid,
    pub channel_type: ChannelType,
    pub enabled: bool,
    /// Type-specific settings (webhook URL + headers, SMTP host/port/
    /// credentials, bot webhook URL, ...). Required keys per type are
    /// enforced by the corresponding provider's `configure`.
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EndpointDown,
    EndpointUp,
    IncidentCreated,
    IncidentUpdated,
    IncidentResolved,
    /// Synthetic event sent on demand to verify a channel is wired up
    /// correctly, never produced by the monitoring pipeline itself.
    Test,
}

/// A domain event to be fanned out to every enabled notification provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: Option<Severity>,
    pub endpoint_id: Option<Uuid>,
    pub incident_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            severity: None,
            endpoint_id: None,
            incident_id: None,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint_id: Uuid) -> Self {
        self.endpoint_id = Some(endpoint_id);
        self
    }

    pub fn with_incident(mut self, incident_id: Uuid) -> Self {
        self.incident_id = Some(incident_id);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Outcome of delivering one event to one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub provider: ChannelType,
    pub success: bool,
    pub error: Option<String>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn ok(provider: ChannelType, detail: impl Into<String>) -> Self {
        Self {
            provider,
            success: true,
            error: None,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }

    pub fn err(provider: ChannelType, error: impl Into<String>) -> Self {
        Self {
            provider,
            success: false,
            error: Some(error.into()),
            detail: None,
            at: Utc::now(),
        }
    }
}
