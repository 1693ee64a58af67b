//! Retrying fan-out dispatcher. A `retry_with_backoff` attempt loop drives
//! each provider independently and concurrently, collecting per-provider
//! outcomes into a map.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::Rng;
use sentinel_core::{ChannelType, DeliveryResult, NotificationEvent};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::error::NotifyError;
use crate::providers::Provider;
use crate::registry::ProviderRegistry;

/// Dispatch policy: attempt budget and backoff shape for one provider send.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

/// Drives the registry's enabled providers for one event and collects a
/// per-provider `DeliveryResult`, retrying each provider independently.
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Fan out `event` to every enabled provider concurrently. Returns the
    /// per-provider outcome map; the caller decides what counts as overall
    /// failure.
    pub async fn send_to_all(
        &self,
        registry: &ProviderRegistry,
        event: &NotificationEvent,
        cancel: &CancellationToken,
    ) -> BTreeMap<ChannelType, DeliveryResult> {
        let providers = registry.enabled_providers();
        let mut tasks: JoinSet<(ChannelType, DeliveryResult)> = JoinSet::new();

        for provider in providers {
            let event = event.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let channel = provider.provider_type();
                let result = dispatch_with_retry(provider.as_ref(), &event, &config, &cancel)
                    .instrument(info_span!("dispatch_provider", channel = ?channel))
                    .await;
                (channel, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((channel, result)) = joined {
                results.insert(channel, result);
            }
        }
        results
    }
}

async fn dispatch_with_retry(
    provider: &dyn Provider,
    event: &NotificationEvent,
    config: &DispatchConfig,
    cancel: &CancellationToken,
) -> DeliveryResult {
    let channel = provider.provider_type();
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            return DeliveryResult::err(channel, "dispatch cancelled");
        }

        match provider.send(event).await {
            Ok(result) => return result,
            Err(e) => {
                if attempt == config.max_attempts {
                    return DeliveryResult::err(channel, e.to_string());
                }
                if matches!(e, NotifyError::NotConfigured(_) | NotifyError::MissingSetting(_)) {
                    // Configuration errors never recover on retry.
                    return DeliveryResult::err(channel, e.to_string());
                }
                warn!(?channel, attempt, error = %e, "provider send failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return DeliveryResult::err(channel, "dispatch cancelled"),
                }
                delay = delay.mul_f64(config.backoff_factor).min(config.max_delay);
                if config.jitter_fraction > 0.0 {
                    let jitter_frac = rand::thread_rng().gen_range(0.0..config.jitter_fraction);
                    delay = (delay + delay.mul_f64(jitter_frac)).min(config.max_delay);
                }
            }
        }
    }

    unreachable!("loop always returns by the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::NotificationKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyProvider {
        channel: ChannelType,
        fail_times: Arc<AtomicU32>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn provider_type(&self) -> ChannelType {
            self.channel
        }
        fn is_enabled(&self) -> bool {
            true
        }
        fn configure(&mut self, _config: &sentinel_core::NotificationChannelConfig) -> crate::error::NotifyResult<()> {
            Ok(())
        }
        async fn send(&self, _event: &NotificationEvent) -> crate::error::NotifyResult<DeliveryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_times.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            }).is_ok() {
                Err(NotifyError::Transport("flaky".into()))
            } else {
                Ok(DeliveryResult::ok(self.channel, "ok"))
            }
        }
        async fn test_connection(&self) -> crate::error::NotifyResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let provider = FlakyProvider {
            channel: ChannelType::Webhook,
            fail_times: Arc::new(AtomicU32::new(1)),
            calls: Arc::new(AtomicU32::new(0)),
        };
        let config = DispatchConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter_fraction: 0.0,
        };
        let event = NotificationEvent::new(NotificationKind::EndpointDown, "t", "m");
        let cancel = CancellationToken::new();
        let result = dispatch_with_retry(&provider, &event, &config, &cancel).await;
        assert!(result.success);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let provider = FlakyProvider {
            channel: ChannelType::Slack,
            fail_times: Arc::new(AtomicU32::new(100)),
            calls: Arc::new(AtomicU32::new(0)),
        };
        let config = DispatchConfig::default();
        let event = NotificationEvent::new(NotificationKind::EndpointDown, "t", "m");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dispatch_with_retry(&provider, &event, &config, &cancel).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("dispatch cancelled"));
    }
}
