//! Configuration loading. Layers, lowest to highest precedence: compiled
//! defaults, an optional TOML file, then `SENTINEL_` prefixed environment
//! variables (`__` as the nested-key separator).

use std::env;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::AppConfig;

const ENV_PREFIX: &str = "SENTINEL";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_FILENAME: &str = "sentinel.toml";

/// Load the application configuration from its three layers and validate
/// it. Fails fast with a descriptive error; the composition root turns
/// that into a non-zero process exit.
pub fn load_config() -> ConfigResult<AppConfig> {
    let config_path = env::var("SENTINEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILENAME.to_string());

    let builder = config::Config::builder()
        .add_source(config::File::with_name(&config_path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

    let raw = builder.build()?;
    let app_config: AppConfig = raw.try_deserialize()?;
    validate(&app_config)?;
    Ok(app_config)
}

fn validate(config: &AppConfig) -> ConfigResult<()> {
    if config.security.jwt_secret.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "security.jwt_secret".into(),
            reason: "must not be empty".into(),
        });
    }
    if config.security.session_secret.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "security.session_secret".into(),
            reason: "must not be empty".into(),
        });
    }
    if config.database.backend != crate::schema::DatabaseBackend::Memory && config.database.url.is_none() {
        return Err(ConfigError::Validation {
            field: "database.url".into(),
            reason: "required for non-memory database backends".into(),
        });
    }
    if config.cache.backend == crate::schema::CacheBackend::Remote && config.cache.remote_url.is_none() {
        return Err(ConfigError::Validation {
            field: "cache.remote_url".into(),
            reason: "required when cache.backend is \"remote\"".into(),
        });
    }
    if config.engine.worker_pool_size == 0 {
        return Err(ConfigError::Validation {
            field: "engine.worker_pool_size".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        for (k, v) in vars {
            env::set_var(k, v);
        }
        f();
        for (k, _) in vars {
            env::remove_var(k);
        }
    }

    #[test]
    fn missing_secrets_fail_validation() {
        with_env(
            &[
                ("SENTINEL_CONFIG", "/nonexistent/sentinel.toml"),
                ("SENTINEL_SECURITY__JWT_SECRET", ""),
                ("SENTINEL_SECURITY__SESSION_SECRET", "s"),
            ],
            || {
                let result = load_config();
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn env_overrides_populate_required_secrets() {
        with_env(
            &[
                ("SENTINEL_CONFIG", "/nonexistent/sentinel.toml"),
                ("SENTINEL_SECURITY__JWT_SECRET", "jwt-secret-value"),
                ("SENTINEL_SECURITY__SESSION_SECRET", "session-secret-value"),
            ],
            || {
                let config = load_config().unwrap();
                assert_eq!(config.security.jwt_secret, "jwt-secret-value");
                assert_eq!(config.server.port, 8080, "unset fields keep their compiled default");
            },
        );
    }

    #[test]
    fn toml_file_is_read_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
            [server]
            port = 9090

            [security]
            jwt_secret = "from-file"
            session_secret = "from-file-session"
            "#
        )
        .unwrap();

        with_env(&[("SENTINEL_CONFIG", path.to_str().unwrap())], || {
            let config = load_config().unwrap();
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.security.jwt_secret, "from-file");
        });
    }

    #[test]
    fn remote_cache_backend_requires_a_url() {
        with_env(
            &[
                ("SENTINEL_CONFIG", "/nonexistent/sentinel.toml"),
                ("SENTINEL_SECURITY__JWT_SECRET", "a"),
                ("SENTINEL_SECURITY__SESSION_SECRET", "b"),
                ("SENTINEL_CACHE__BACKEND", "remote"),
            ],
            || {
                let result = load_config();
                assert!(result.is_err());
            },
        );
    }
}
