//! Shared application state: a thin, cheaply-`Clone`able `Arc<Inner>`
//! handle to every subsystem an axum handler might reach for.

use std::sync::Arc;

use dashmap::DashMap;
use sentinel_broadcast::BroadcastHub;
use sentinel_cache::csrf::CsrfGuard;
use sentinel_cache::rate_limit::RateLimiter;
use sentinel_cache::Cache;
use sentinel_config::AppConfig;
use sentinel_core::{ChannelType, EndpointState, Metrics, NotificationChannelConfig};
use sentinel_engine::Scheduler;
use sentinel_notify::{
    DiscordProvider, Dispatcher, EmailProvider, Provider, ProviderRegistry, SlackProvider,
    WebhookProvider,
};
use sentinel_repository::Repository;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

struct Inner {
    config: Arc<AppConfig>,
    repository: Arc<dyn Repository>,
    cache: Arc<dyn Cache>,
    rate_limiter: RateLimiter,
    csrf: CsrfGuard,
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    broadcast: BroadcastHub,
    scheduler: Arc<Scheduler>,
    current_states: Arc<DashMap<Uuid, EndpointState>>,
    metrics: Arc<Metrics>,
}

/// Handle to every subsystem the HTTP surface talks to. `Clone` is an
/// `Arc` bump, as `axum::extract::State` requires.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        repository: Arc<dyn Repository>,
        cache: Arc<dyn Cache>,
        rate_limiter: RateLimiter,
        csrf: CsrfGuard,
        registry: Arc<ProviderRegistry>,
        dispatcher: Arc<Dispatcher>,
        broadcast: BroadcastHub,
        scheduler: Arc<Scheduler>,
        current_states: Arc<DashMap<Uuid, EndpointState>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self(Arc::new(Inner {
            config,
            repository,
            cache,
            rate_limiter,
            csrf,
            registry,
            dispatcher,
            broadcast,
            scheduler,
            current_states,
            metrics,
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.0.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.0.repository
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.0.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.0.rate_limiter
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.0.csrf
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.0.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.0.dispatcher
    }

    pub fn broadcast(&self) -> BroadcastHub {
        self.0.broadcast.clone()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.0.scheduler
    }

    pub fn current_states(&self) -> &Arc<DashMap<Uuid, EndpointState>> {
        &self.0.current_states
    }

    pub fn metrics(&self) -> &Metrics {
        &self.0.metrics
    }

    /// Build, configure, and (re-)register the provider for `config`'s
    /// channel type. The registry holds at most one instance per
    /// `ChannelType`, so this always replaces whatever was registered before.
    pub fn reconfigure_provider(&self, config: &NotificationChannelConfig) -> ApiResult<()> {
        let mut provider: Box<dyn Provider> = match config.channel_type {
            ChannelType::Webhook => Box::new(WebhookProvider::new()),
            ChannelType::Slack => Box::new(SlackProvider::new()),
            ChannelType::Discord => Box::new(DiscordProvider::new()),
            ChannelType::Email => Box::new(EmailProvider::new()),
        };
        provider.configure(config).map_err(|e| ApiError::Validation {
            field: "settings".into(),
            reason: e.to_string(),
        })?;
        self.registry().register(Arc::from(provider));
        Ok(())
    }
}
