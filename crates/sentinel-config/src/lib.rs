//! Layered application configuration.

mod config;
mod error;
mod schema;

pub use config::load_config;
pub use error::{ConfigError, ConfigResult};
pub use schema::{
    AppConfig, BroadcastSection, CacheBackend, CacheSection, CorsSection, DatabaseBackend,
    DatabaseSection, EngineSection, NotifySection, RateLimitSection, SecuritySection, ServerSection,
};
