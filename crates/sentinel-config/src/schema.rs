//! Configuration schema. Defaults are provided per field so that a missing
//! TOML file and an empty environment still produce a runnable (if
//! minimal) configuration; secrets are the exception and are never
//! defaulted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub cache: CacheSection,
    pub security: SecuritySection,
    #[serde(default)]
    pub cors: CorsSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub broadcast: BroadcastSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub notify: NotifySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub force_https: bool,
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_trusted_proxies() -> Vec<String> {
    Vec::new()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            force_https: false,
            trusted_proxies: default_trusted_proxies(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackend,
    /// Connection string. Required (no default) once `backend` is not
    /// `memory`; validated in `AppConfig::validate`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_probe_retention_days")]
    pub probe_retention_days: u32,
}

fn default_database_backend() -> DatabaseBackend {
    DatabaseBackend::Memory
}
fn default_probe_retention_days() -> u32 {
    90
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            url: None,
            probe_retention_days: default_probe_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    Remote,
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_janitor_sweep_secs")]
    pub janitor_sweep_secs: u64,
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Memory
}
fn default_janitor_sweep_secs() -> u64 {
    300
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            remote_url: None,
            janitor_sweep_secs: default_janitor_sweep_secs(),
        }
    }
}

/// Secrets. No compiled defaults — absence is a startup error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    pub jwt_secret: String,
    pub session_secret: String,
    #[serde(default = "default_csp_policy")]
    pub csp_policy: String,
}

fn default_csp_policy() -> String {
    "default-src 'self'".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSection {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_probe_interval_secs")]
    pub default_probe_interval_secs: u32,
    #[serde(default = "default_probe_timeout_secs")]
    pub default_probe_timeout_secs: u32,
    #[serde(default = "default_max_retry_attempts")]
    pub default_max_retry_attempts: u8,
    #[serde(default = "default_retry_backoff_secs")]
    pub default_retry_backoff_secs: u32,
    #[serde(default = "default_graceful_shutdown_secs")]
    pub graceful_shutdown_secs: u64,
}

fn default_worker_pool_size() -> usize {
    10
}
fn default_probe_interval_secs() -> u32 {
    60
}
fn default_probe_timeout_secs() -> u32 {
    5
}
fn default_max_retry_attempts() -> u8 {
    2
}
fn default_retry_backoff_secs() -> u32 {
    1
}
fn default_graceful_shutdown_secs() -> u64 {
    30
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            default_probe_interval_secs: default_probe_interval_secs(),
            default_probe_timeout_secs: default_probe_timeout_secs(),
            default_max_retry_attempts: default_max_retry_attempts(),
            default_retry_backoff_secs: default_retry_backoff_secs(),
            graceful_shutdown_secs: default_graceful_shutdown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSection {
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_status_broadcast_interval_secs")]
    pub status_broadcast_interval_secs: u64,
}

fn default_mailbox_capacity() -> usize {
    32
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_status_broadcast_interval_secs() -> u64 {
    30
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            ping_interval_secs: default_ping_interval_secs(),
            status_broadcast_interval_secs: default_status_broadcast_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_public_budget")]
    pub public_per_minute: u32,
    #[serde(default = "default_auth_budget")]
    pub auth_per_minute: u32,
    #[serde(default = "default_general_budget")]
    pub general_per_minute: u32,
}

fn default_public_budget() -> u32 {
    60
}
fn default_auth_budget() -> u32 {
    10
}
fn default_general_budget() -> u32 {
    120
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            public_per_minute: default_public_budget(),
            auth_per_minute: default_auth_budget(),
            general_per_minute: default_general_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}
