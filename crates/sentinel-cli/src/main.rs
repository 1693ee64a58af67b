//! Composition root. Wires configuration, repository, cache, engine,
//! notification pipeline, and broadcast hub into a running HTTP service,
//! then drains completed probes into state transitions, incident
//! decisions, and outbound notifications until shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use sentinel_broadcast::BroadcastHub;
use sentinel_cache::csrf::CsrfGuard;
use sentinel_cache::memory::MemoryCache;
use sentinel_cache::noop::NoopCache;
use sentinel_cache::rate_limit::{RateLimitBudgets, RateLimiter};
use sentinel_cache::remote::RemoteCache;
use sentinel_cache::Cache;
use sentinel_config::{AppConfig, CacheBackend, DatabaseBackend};
use sentinel_core::{
    decide, EndpointState, IncidentDecision, Metrics, NotificationEvent, NotificationKind,
    ProbeResult, StateDeriver,
};
use sentinel_engine::{ControlEvent, Prober, Scheduler};
use sentinel_notify::{DispatchConfig, Dispatcher, ProviderRegistry};
use sentinel_repository::{InMemoryRepository, Repository};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Status-monitoring service: scheduler, incident lifecycle, notifications, SSE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate configuration, then exit — useful in deploy
    /// pipelines before rolling out a new config.
    CheckConfig,
    /// Start the HTTP server and background pipeline.
    Serve {
        /// Override `server.bind_address` from config.
        #[arg(long)]
        host: Option<String>,
        /// Override `server.port` from config.
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("SENTINEL_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = sentinel_config::load_config()?;

    match cli.command {
        Commands::CheckConfig => {
            info!("configuration loaded and valid");
            Ok(())
        }
        Commands::Serve { host, port } => serve(config, host, port).await,
    }
}

async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn Cache>> {
    match config.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::with_janitor_interval(Duration::from_secs(
            config.cache.janitor_sweep_secs,
        )))),
        CacheBackend::Noop => Ok(Arc::new(NoopCache)),
        CacheBackend::Remote => {
            let url = config
                .cache
                .remote_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("cache.remote_url is required for the remote backend"))?;
            let cache = RemoteCache::connect(url).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
            Ok(Arc::new(cache))
        }
    }
}

async fn serve(config: AppConfig, host_override: Option<String>, port_override: Option<u16>) -> anyhow::Result<()> {
    let config = Arc::new(config);

    if config.database.backend != DatabaseBackend::Memory {
        anyhow::bail!(
            "database.backend = {:?} has no repository implementation in this build; only \"memory\" is supported",
            config.database.backend
        );
    }

    let cache = build_cache(&config).await?;
    let rate_limiter = RateLimiter::new(
        cache.clone(),
        RateLimitBudgets {
            public_per_minute: config.rate_limit.public_per_minute,
            auth_per_minute: config.rate_limit.auth_per_minute,
            general_per_minute: config.rate_limit.general_per_minute,
            window: Duration::from_secs(60),
        },
    );
    let csrf = CsrfGuard::new(cache.clone(), config.cors.allowed_origins.clone());

    let registry = Arc::new(ProviderRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(DispatchConfig {
        max_attempts: config.notify.max_attempts,
        initial_delay: Duration::from_millis(config.notify.initial_delay_ms),
        max_delay: Duration::from_millis(config.notify.max_delay_ms),
        ..Default::default()
    }));

    let broadcast = BroadcastHub::new(config.broadcast.mailbox_capacity);
    let current_states: Arc<DashMap<Uuid, EndpointState>> = Arc::new(DashMap::new());
    let metrics = Arc::new(Metrics::default());

    // One concrete repository, cloned twice: `BroadcastHub::spawn_background_tasks`
    // is generic over a `Sized` repository and cannot take `Arc<dyn Repository>`.
    let repository_concrete = Arc::new(InMemoryRepository::new());
    let repository: Arc<dyn Repository> = repository_concrete.clone();

    let prober = Arc::new(Prober::new()?);
    let (result_tx, result_rx) = mpsc::channel::<ProbeResult>(256);
    let scheduler = Scheduler::new(config.engine.worker_pool_size, prober, result_tx);

    let state = sentinel_api::state::AppState::new(
        config.clone(),
        repository.clone(),
        cache.clone(),
        rate_limiter,
        csrf,
        registry.clone(),
        dispatcher.clone(),
        broadcast.clone(),
        scheduler.clone(),
        current_states.clone(),
        metrics.clone(),
    );

    for channel in repository.list_channels().await? {
        if channel.enabled {
            if let Err(e) = state.reconfigure_provider(&channel) {
                warn!(channel_id = %channel.id, error = %e, "failed to configure notification provider at startup");
            }
        }
    }

    let broadcast_tasks = broadcast.spawn_background_tasks(
        repository_concrete.clone(),
        current_states.clone(),
        Duration::from_secs(config.broadcast.ping_interval_secs),
        Duration::from_secs(config.broadcast.status_broadcast_interval_secs),
    );

    let retention_sweep = tokio::spawn(run_retention_sweep(
        repository.clone(),
        config.database.probe_retention_days,
    ));

    let runner = tokio::spawn(scheduler.clone().run());

    for endpoint in repository.list_all_enabled_endpoints().await? {
        scheduler.apply(ControlEvent::Add(endpoint)).await;
    }

    let pipeline_cancel = CancellationToken::new();
    let pipeline = tokio::spawn(run_pipeline(
        result_rx,
        repository.clone(),
        broadcast.clone(),
        registry.clone(),
        dispatcher.clone(),
        current_states.clone(),
        metrics.clone(),
        pipeline_cancel.clone(),
    ));

    let bind_address = host_override.unwrap_or_else(|| config.server.bind_address.clone());
    let port = port_override.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {bind_address}:{port}: {e}"))?;

    let app = sentinel_api::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "sentinel listening");

    let graceful_shutdown_secs = config.engine.graceful_shutdown_secs;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, draining scheduler");
    scheduler.shutdown(Duration::from_secs(graceful_shutdown_secs)).await;
    pipeline_cancel.cancel();
    runner.abort();
    pipeline.abort();
    retention_sweep.abort();
    for task in broadcast_tasks {
        task.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Once a day, deletes probe results older than `retention_days`. Owned by
/// the composition root rather than the repository struct itself, in the
/// same spirit as `MemoryCache`'s internal janitor but without requiring the
/// repository to hold its own `Arc` handle.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

async fn run_retention_sweep(repository: Arc<dyn Repository>, retention_days: u32) {
    let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
        match repository.prune_probe_results(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, retention_days, "probe retention sweep completed");
                }
            }
            Err(e) => warn!(error = %e, "probe retention sweep failed"),
        }
    }
}

/// Drains completed probes, persists them, derives state transitions, and
/// reacts to incident-lifecycle decisions: opening/resolving auto-incidents
/// under the repository's compare-and-set methods, publishing the
/// transition to SSE subscribers, and fanning out notifications.
#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    mut result_rx: mpsc::Receiver<ProbeResult>,
    repository: Arc<dyn Repository>,
    broadcast: BroadcastHub,
    registry: Arc<ProviderRegistry>,
    dispatcher: Arc<Dispatcher>,
    current_states: Arc<DashMap<Uuid, EndpointState>>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    let mut derivers: HashMap<Uuid, StateDeriver> = HashMap::new();

    while let Some(result) = result_rx.recv().await {
        metrics.record_probe(result.success);
        if let Err(e) = repository.insert_probe_result(result.clone()).await {
            warn!(error = %e, "failed to persist probe result");
        }

        let deriver = derivers.entry(result.endpoint_id).or_default();
        let Some(transition) = deriver.record(result) else {
            continue;
        };

        current_states.insert(transition.endpoint_id, transition.new_state);
        broadcast.publish_transition(transition.clone());

        let endpoint = match repository.get_endpoint(transition.endpoint_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(endpoint_id = %transition.endpoint_id, error = %e, "endpoint vanished before its transition could be handled");
                continue;
            }
        };

        let decision = decide(
            transition.endpoint_id,
            &endpoint.name,
            endpoint.critical,
            transition.old_state,
            transition.new_state,
            transition.at,
        );

        match decision {
            IncidentDecision::Open { incident, association } => {
                match repository
                    .try_open_auto_incident(transition.endpoint_id, incident, association)
                    .await
                {
                    Ok(opened) => {
                        metrics.record_incident_opened();
                        let event = NotificationEvent::new(NotificationKind::EndpointDown, opened.title.clone(), format!("{} is down", endpoint.name))
                            .with_endpoint(transition.endpoint_id)
                            .with_incident(opened.id)
                            .with_severity(opened.severity);
                        dispatch_and_record(&dispatcher, &registry, &repository, &metrics, event, &cancel).await;
                    }
                    Err(e) => warn!(endpoint_id = %transition.endpoint_id, error = %e, "failed to open auto-incident"),
                }
            }
            IncidentDecision::ResolveOpenAuto { endpoint_id, at } => {
                match repository.resolve_open_auto_incident(endpoint_id, at).await {
                    Ok(resolved) => {
                        metrics.record_incident_resolved();
                        let event = NotificationEvent::new(
                            NotificationKind::EndpointUp,
                            format!("{} recovered", endpoint.name),
                            resolved.title.clone(),
                        )
                        .with_endpoint(endpoint_id)
                        .with_incident(resolved.id)
                        .with_severity(resolved.severity);
                        dispatch_and_record(&dispatcher, &registry, &repository, &metrics, event, &cancel).await;
                    }
                    Err(e) => {
                        // No open auto-incident to resolve is routine (e.g. the
                        // endpoint never crossed into Down in this process's
                        // lifetime); only log anything louder for a genuine
                        // backend error.
                        warn!(endpoint_id = %endpoint_id, error = %e, "no open auto-incident to resolve");
                    }
                }
            }
            IncidentDecision::NoOp => {}
        }
    }
}

async fn dispatch_and_record(
    dispatcher: &Dispatcher,
    registry: &ProviderRegistry,
    repository: &Arc<dyn Repository>,
    metrics: &Metrics,
    event: NotificationEvent,
    cancel: &CancellationToken,
) {
    let results = dispatcher.send_to_all(registry, &event, cancel).await;
    for (channel, delivery) in results {
        metrics.record_delivery(channel, delivery.success);
        if let Err(e) = repository.record_delivery(event.id, channel, delivery).await {
            warn!(event_id = %event.id, channel = ?channel, error = %e, "failed to record delivery");
        }
    }
}

