use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {field} — {reason}")]
    Validation { field: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
