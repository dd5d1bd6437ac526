//! Error types shared by the ingestion and persistence layers.
//!
//! The variants encode how a failure is handled, not where it came from:
//! transient failures are retried, upstream data failures are skipped,
//! persistence failures abort the enclosing batch and configuration
//! failures fall back to defaults.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoinPulseError {
    /// Timeouts, connection failures, 5xx and 429 responses
    #[error("transient network error during {operation}: {message}")]
    TransientNetwork { operation: String, message: String },

    /// Malformed or incomplete upstream payloads
    #[error("upstream data error: {0}")]
    UpstreamData(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoinPulseError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamData(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}

impl From<tokio_postgres::Error> for CoinPulseError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for CoinPulseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for CoinPulseError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Self::transient("http request", e.to_string());
        }
        match e.status() {
            Some(status) if status.is_server_error() || status.as_u16() == 429 => {
                Self::transient("http request", e.to_string())
            },
            _ => Self::UpstreamData(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoinPulseError>;
