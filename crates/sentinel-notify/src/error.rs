use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("provider {0:?} is not configured")]
    NotConfigured(sentinel_core::ChannelType),
    #[error("missing required setting {0:?} for this provider")]
    MissingSetting(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected the message: {0}")]
    Rejected(String),
    #[error("dispatch cancelled")]
    Cancelled,
}

pub type NotifyResult<T> = Result<T, NotifyError>;
