use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found: {id}")]
    NotFound { id: String },

    #[error("turn limit reached for conversation {id}")]
    TurnLimitReached { id: String },
}

pub type Result<T> = std::result::Result<T, ConversationError>;
