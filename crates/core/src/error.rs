use thiserror::Error;

pub type AtlasResult<T> = Result<T, AtlasError>;

#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Provider response shape error: {0}")]
    DataShape(String),

    #[error("Deadline exceeded while waiting for a request slot")]
    DeadlineExceeded,

    #[error("Webhook validation failed: {0}")]
    Validation(String),

    #[error("Webhook signature mismatch")]
    Signature,

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Unknown workspace or connection: {0}")]
    MissingConnection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
