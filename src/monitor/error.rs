use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("RPC node rate limited the request")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cursor store error: {0}")]
    Store(String),

    #[error("Notification sink error: {0}")]
    Sink(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Only rate limiting is retried; everything else propagates on first failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MonitorError::RateLimited)
    }
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
