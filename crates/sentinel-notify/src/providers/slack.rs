//! Slack incoming-webhook provider.

use async_trait::async_trait;
use reqwest::Client;
use sentinel_core::{ChannelType, DeliveryResult, NotificationChannelConfig, NotificationEvent};
use serde_json::json;

use crate::error::{NotifyError, NotifyResult};
use crate::providers::Provider;

#[derive(Default)]
pub struct SlackProvider {
    client: Client,
    enabled: bool,
    webhook_url: Option<String>,
}

impl SlackProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            enabled: false,
            webhook_url: None,
        }
    }
}

#[async_trait]
impl Provider for SlackProvider {
    fn provider_type(&self) -> ChannelType {
        ChannelType::Slack
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.webhook_url.is_some()
    }

    fn configure(&mut self, config: &NotificationChannelConfig) -> NotifyResult<()> {
        let url = config
            .settings
            .get("webhook_url")
            .ok_or_else(|| NotifyError::MissingSetting("webhook_url".into()))?;
        self.webhook_url = Some(url.clone());
        self.enabled = config.enabled;
        Ok(())
    }

    async fn send(&self, event: &NotificationEvent) -> NotifyResult<DeliveryResult> {
        let url = self
            .webhook_url
            .as_ref()
            .ok_or(NotifyError::NotConfigured(ChannelType::Slack))?;
        let payload = json!({
            "text": format!("*{}*\n{}", event.title, event.message),
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(DeliveryResult::ok(ChannelType::Slack, format!("{status}")))
        } else {
            Err(NotifyError::Rejected(format!("slack returned {status}")))
        }
    }

    async fn test_connection(&self) -> NotifyResult<()> {
        self.webhook_url
            .as_ref()
            .ok_or(NotifyError::NotConfigured(ChannelType::Slack))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::NotificationKind;
    use std::collections::BTreeMap;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_formatted_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut provider = SlackProvider::new();
        provider
            .configure(&NotificationChannelConfig {
                id: uuid::Uuid::new_v4(),
                channel_type: ChannelType::Slack,
                enabled: true,
                settings: BTreeMap::from([("webhook_url".to_string(), server.uri())]),
            })
            .unwrap();

        let event = NotificationEvent::new(NotificationKind::IncidentCreated, "Incident", "endpoint down");
        let result = provider.send(&event).await.unwrap();
        assert!(result.success);
    }
}
