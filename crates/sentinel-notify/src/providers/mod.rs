//! Provider contract. Each channel type implements this trait; the
//! registry holds one boxed instance per `ChannelType`.

pub mod discord;
pub mod email;
pub mod slack;
pub mod webhook;

use async_trait::async_trait;
use sentinel_core::{ChannelType, DeliveryResult, NotificationChannelConfig, NotificationEvent};

use crate::error::NotifyResult;

#[async_trait]
pub trait Provider: Send + Sync {
    fn provider_type(&self) -> ChannelType;
    fn is_enabled(&self) -> bool;
    fn configure(&mut self, config: &NotificationChannelConfig) -> NotifyResult<()>;
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<DeliveryResult>;
    async fn test_connection(&self) -> NotifyResult<()>;
}

pub use discord::DiscordProvider;
pub use email::EmailProvider;
pub use slack::SlackProvider;
pub use webhook::WebhookProvider;
