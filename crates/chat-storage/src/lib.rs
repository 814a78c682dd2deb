pub mod analytics;
pub mod contact;
pub mod error;
mod fswrite;
pub mod types;

pub use analytics::ConversationStorage;
pub use contact::ContactStorage;
pub use error::StorageError;
