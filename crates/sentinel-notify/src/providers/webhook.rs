//! Generic webhook provider. POSTs a JSON envelope to a configured URL
//! with configured headers; success iff the response is 2xx.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use sentinel_core::{ChannelType, DeliveryResult, NotificationChannelConfig, NotificationEvent};
use serde_json::json;

use crate::error::{NotifyError, NotifyResult};
use crate::providers::Provider;

#[derive(Default)]
pub struct WebhookProvider {
    client: Client,
    enabled: bool,
    url: Option<String>,
    headers: BTreeMap<String, String>,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            enabled: false,
            url: None,
            headers: BTreeMap::new(),
        }
    }

    fn payload(event: &NotificationEvent) -> serde_json::Value {
        json!({
            "type": event.kind,
            "title": event.title,
            "message": event.message,
            "timestamp": event.timestamp,
            "severity": event.severity,
            "endpoint_id": event.endpoint_id,
            "incident_id": event.incident_id,
        })
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    fn provider_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.url.is_some()
    }

    fn configure(&mut self, config: &NotificationChannelConfig) -> NotifyResult<()> {
        let url = config
            .settings
            .get("url")
            .ok_or_else(|| NotifyError::MissingSetting("url".into()))?;
        self.url = Some(url.clone());
        self.headers = config
            .settings
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("header.").map(|name| (name.to_string(), v.clone())))
            .collect();
        self.enabled = config.enabled;
        Ok(())
    }

    async fn send(&self, event: &NotificationEvent) -> NotifyResult<DeliveryResult> {
        let url = self.url.as_ref().ok_or(NotifyError::NotConfigured(ChannelType::Webhook))?;
        let mut request = self.client.post(url).json(&Self::payload(event));
        if !self.headers.contains_key("Content-Type") {
            request = request.header("Content-Type", "application/json");
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(DeliveryResult::ok(ChannelType::Webhook, format!("{status}")))
        } else {
            Err(NotifyError::Rejected(format!("webhook returned {status}")))
        }
    }

    async fn test_connection(&self) -> NotifyResult<()> {
        self.url
            .as_ref()
            .ok_or(NotifyError::NotConfigured(ChannelType::Webhook))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::NotificationKind;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> NotificationChannelConfig {
        NotificationChannelConfig {
            id: uuid::Uuid::new_v4(),
            channel_type: ChannelType::Webhook,
            enabled: true,
            settings: BTreeMap::from([("url".to_string(), url)]),
        }
    }

    #[tokio::test]
    async fn successful_post_is_a_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut provider = WebhookProvider::new();
        provider.configure(&config(server.uri())).unwrap();
        let event = NotificationEvent::new(NotificationKind::EndpointDown, "down", "it's down");
        let result = provider.send(&event).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn non_2xx_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut provider = WebhookProvider::new();
        provider.configure(&config(server.uri())).unwrap();
        let event = NotificationEvent::new(NotificationKind::EndpointDown, "down", "it's down");
        assert!(provider.send(&event).await.is_err());
    }
}
