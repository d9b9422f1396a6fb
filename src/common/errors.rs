//! Error types for the application

use thiserror::Error;

/// Result type alias using our MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Main error type for monitor operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// CSV reading/writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {message}, retry after {retry_after_ms:?} ms")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// JSON-RPC error object returned by the balance oracle
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Resource not found (message, channel, file)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Retry budget exhausted for a remote call
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Channel receive errors
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classes reported by a message sink
///
/// The dispatch retry driver branches on these, so they stay separate from
/// `MonitorError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Server asked us to back off for the given duration
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: std::time::Duration },

    /// Target message or webhook does not exist
    #[error("Message not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status
    #[error("Sink returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Message could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl SinkError {
    /// Whether the dispatch client should retry this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SinkError::RateLimited { .. } | SinkError::Status { .. } | SinkError::Network(_)
        )
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Network(err.to_string())
    }
}

impl MonitorError {
    /// Whether a retry of the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            MonitorError::HttpRequest(_)
            | MonitorError::RateLimit { .. }
            | MonitorError::InvalidResponse(_)
            | MonitorError::JsonParse(_)
            | MonitorError::Timeout(_) => true,
            MonitorError::Rpc { code, .. } => *code == 429,
            _ => false,
        }
    }

    /// Whether this error stems from missing or invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, MonitorError::Configuration(_))
    }
}
