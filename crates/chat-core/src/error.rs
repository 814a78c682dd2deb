use thiserror::Error;

/// Crate-wide error type. Client-facing variants map to the closed
/// six-code taxonomy via [`ChatError::code`]; everything else is an
/// internal condition that gets folded into `internal_error` before it
/// crosses the HTTP boundary.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("input too long")]
    InputTooLong,

    #[error("blocked: {reason}")]
    BlockedInput { reason: String },

    #[error("safety check failed")]
    SafetyFailed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("llm provider error: {0}")]
    Provider(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable, machine-readable client-facing code (spec §7).
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::RateLimited { .. } => "rate_limited",
            ChatError::InputTooLong => "input_too_long",
            ChatError::BlockedInput { .. } => "blocked_input",
            ChatError::SafetyFailed => "safety_failed",
            // Internal-only conditions never reach the client with their
            // own code; they always fold into internal_error.
            ChatError::Config(_)
            | ChatError::Storage(_)
            | ChatError::Provider(_)
            | ChatError::Io(_)
            | ChatError::Serialization(_)
            | ChatError::Internal(_) => "internal_error",
        }
    }

    /// Short, non-technical, user-safe message. Never discloses internal state.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::RateLimited { .. } => {
                "You're sending messages too quickly. Please wait a moment and try again.".into()
            }
            ChatError::InputTooLong => "Your message is too long. Please shorten it and try again.".into(),
            ChatError::BlockedInput { .. } => {
                "I can't process that message. Please rephrase your question.".into()
            }
            ChatError::SafetyFailed => {
                "Let me rephrase that. I'd be happy to tell you about Kellogg's professional background and projects. What would you like to know?".into()
            }
            _ => "Something went wrong on our end. Please try again in a moment.".into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
