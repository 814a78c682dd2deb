use std::time::Duration;
use thiserror::Error;

/// Errors returned by an LLM runtime call. `recoverable()` drives the
/// client's retry policy: connection and timeout errors are retried with
/// exponential backoff, everything else is not.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("model not found or unavailable: {0}")]
    ModelError(String),

    #[error("invalid response from runtime: {0}")]
    ResponseError(String),
}

impl ProviderError {
    pub fn recoverable(&self) -> bool {
        matches!(self, ProviderError::Connection(_) | ProviderError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
