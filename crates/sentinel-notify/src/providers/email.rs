//! SMTP email provider. Submits one message per event via `lettre`'s
//! async SMTP transport; success iff the server accepts it.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sentinel_core::{ChannelType, DeliveryResult, NotificationChannelConfig, NotificationEvent};

use crate::error::{NotifyError, NotifyResult};
use crate::providers::Provider;

#[derive(Default)]
pub struct EmailProvider {
    enabled: bool,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
}

impl EmailProvider {
    pub fn new() -> Self {
        Self {
            enabled: false,
            transport: None,
            from: None,
            to: Vec::new(),
        }
    }

    fn setting<'a>(config: &'a NotificationChannelConfig, key: &str) -> NotifyResult<&'a str> {
        config
            .settings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| NotifyError::MissingSetting(key.into()))
    }
}

#[async_trait]
impl Provider for EmailProvider {
    fn provider_type(&self) -> ChannelType {
        ChannelType::Email
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.transport.is_some()
    }

    fn configure(&mut self, config: &NotificationChannelConfig) -> NotifyResult<()> {
        let host = Self::setting(config, "smtp_host")?;
        let port: u16 = Self::setting(config, "smtp_port")?
            .parse()
            .map_err(|_| NotifyError::MissingSetting("smtp_port (not a valid u16)".into()))?;
        let from = Self::setting(config, "from")?;
        let to = Self::setting(config, "to")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
        if let (Ok(username), Ok(password)) = (
            Self::setting(config, "username"),
            Self::setting(config, "password"),
        ) {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        self.transport = Some(builder.build());
        self.from = Some(
            from.parse()
                .map_err(|_| NotifyError::MissingSetting("from (not a valid mailbox)".into()))?,
        );
        self.to = to
            .split(',')
            .map(|addr| addr.trim().parse())
            .collect::<Result<Vec<Mailbox>, _>>()
            .map_err(|_| NotifyError::MissingSetting("to (not a valid mailbox list)".into()))?;
        self.enabled = config.enabled;
        Ok(())
    }

    async fn send(&self, event: &NotificationEvent) -> NotifyResult<DeliveryResult> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(NotifyError::NotConfigured(ChannelType::Email))?;
        let from = self
            .from
            .clone()
            .ok_or(NotifyError::NotConfigured(ChannelType::Email))?;

        let mut builder = Message::builder().from(from).subject(event.title.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        let message = builder
            .body(event.message.clone())
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(DeliveryResult::ok(ChannelType::Email, "accepted by SMTP server"))
    }

    async fn test_connection(&self) -> NotifyResult<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(NotifyError::NotConfigured(ChannelType::Email))?;
        transport
            .test_connection()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .then_some(())
            .ok_or_else(|| NotifyError::Transport("SMTP server did not accept the handshake".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config() -> NotificationChannelConfig {
        NotificationChannelConfig {
            id: uuid::Uuid::new_v4(),
            channel_type: ChannelType::Email,
            enabled: true,
            settings: BTreeMap::from([
                ("smtp_host".to_string(), "smtp.example.com".to_string()),
                ("smtp_port".to_string(), "587".to_string()),
                ("from".to_string(), "alerts@example.com".to_string()),
                ("to".to_string(), "oncall@example.com".to_string()),
            ]),
        }
    }

    #[test]
    fn configure_requires_all_settings() {
        let mut provider = EmailProvider::new();
        let mut incomplete = config();
        incomplete.settings.remove("smtp_port");
        assert!(provider.configure(&incomplete).is_err());
    }

    #[test]
    fn configure_accepts_a_complete_config() {
        let mut provider = EmailProvider::new();
        assert!(provider.configure(&config()).is_ok());
        assert!(provider.is_enabled());
    }

    #[test]
    fn rejects_invalid_recipient_list() {
        let mut provider = EmailProvider::new();
        let mut bad = config();
        bad.settings.insert("to".to_string(), "not-an-email".to_string());
        assert!(provider.configure(&bad).is_err());
    }
}
