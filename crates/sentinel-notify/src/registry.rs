//! Provider registry. A concurrent map keyed by channel type,
//! holding at most one instance per type; `register` replaces an existing
//! entry. Providers are configured (via `Provider::configure`) before being
//! registered, so the registry only ever holds immutable, ready-to-send
//! instances — `send`/`test_connection` both take `&self`.

use std::sync::Arc;

use dashmap::DashMap;
use sentinel_core::ChannelType;

use crate::providers::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<ChannelType, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.provider_type(), provider);
    }

    pub fn get(&self, channel: ChannelType) -> Option<Arc<dyn Provider>> {
        self.providers.get(&channel).map(|entry| entry.value().clone())
    }

    /// Snapshot the currently enabled providers, suitable for handing to the
    /// dispatcher's concurrent fan-out.
    pub fn enabled_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|entry| entry.value().is_enabled())
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::WebhookProvider;
    use sentinel_core::NotificationChannelConfig;
    use std::collections::BTreeMap;

    fn configured_webhook() -> Arc<dyn Provider> {
        let mut provider = WebhookProvider::new();
        provider
            .configure(&NotificationChannelConfig {
                id: uuid::Uuid::new_v4(),
                channel_type: ChannelType::Webhook,
                enabled: true,
                settings: BTreeMap::from([("url".to_string(), "https://hooks.example.com".to_string())]),
            })
            .unwrap();
        Arc::new(provider)
    }

    #[test]
    fn register_replaces_existing_entry_for_the_same_type() {
        let registry = ProviderRegistry::new();
        registry.register(configured_webhook());
        assert!(registry.get(ChannelType::Webhook).is_some());
        registry.register(configured_webhook());
        assert_eq!(registry.enabled_providers().len(), 1);
    }

    #[test]
    fn unregistered_channel_returns_none() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(ChannelType::Email).is_none());
    }

    #[test]
    fn disabled_providers_are_excluded_from_the_fan_out_set() {
        let registry = ProviderRegistry::new();
        let mut provider = WebhookProvider::new();
        provider
            .configure(&NotificationChannelConfig {
                id: uuid::Uuid::new_v4(),
                channel_type: ChannelType::Webhook,
                enabled: false,
                settings: BTreeMap::from([("url".to_string(), "https://hooks.example.com".to_string())]),
            })
            .unwrap();
        registry.register(Arc::new(provider));
        assert!(registry.enabled_providers().is_empty());
    }
}
