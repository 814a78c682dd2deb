use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    Done,
}

/// Abstraction over a local LLM runtime. Implemented against an
/// Ollama-compatible HTTP surface; kept as a trait so the pipeline never
/// depends on transport details.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f64,
        timeout: Duration,
    ) -> Result<String>;

    /// Requests a JSON-formatted completion (temperature fixed at 0.0 by
    /// the runtime's `format: "json"` option) and parses the result,
    /// tolerating models that wrap their JSON in a markdown fence.
    async fn chat_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<serde_json::Value>;

    /// Appends `latest` to `history` and sends the whole thing as a
    /// single non-streaming chat call.
    async fn chat_with_history(
        &self,
        model: &str,
        history: &[ChatMessage],
        latest: ChatMessage,
        temperature: f64,
        timeout: Duration,
    ) -> Result<String>;

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f64,
        timeout: Duration,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<()>;

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>>;

    /// Default implementation embeds sequentially. The runtime this talks
    /// to has no batch endpoint, so there is nothing to parallelize.
    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(model, text).await?);
        }
        Ok(out)
    }

    async fn health_check(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>>;
}
