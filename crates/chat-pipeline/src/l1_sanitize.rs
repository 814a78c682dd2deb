//! L1 wraps the pure sanitization function from `chat-core`; the pipeline
//! crate owns nothing about the sanitization rules themselves, only how
//! their outcome drives stage flow.

pub use chat_core::sanitize::{sanitize, BlockReason, SanitizeError};
