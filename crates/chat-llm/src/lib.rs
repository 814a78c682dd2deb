pub mod error;
pub mod ollama;
pub mod provider;
mod retry;

pub use error::ProviderError;
pub use ollama::OllamaClient;
pub use provider::{ChatMessage, LlmClient, StreamEvent};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_connection_and_timeout_only() {
        assert!(ProviderError::Connection("x".into()).recoverable());
        assert!(ProviderError::Timeout(std::time::Duration::from_secs(1)).recoverable());
        assert!(!ProviderError::ModelError("x".into()).recoverable());
        assert!(!ProviderError::ResponseError("x".into()).recoverable());
    }

}
