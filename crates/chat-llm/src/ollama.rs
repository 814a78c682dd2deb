//! Ollama-compatible HTTP client. Talks to the local runtime's
//! `/api/chat`, `/api/embeddings` and `/api/tags` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::provider::{ChatMessage, LlmClient, StreamEvent};
use crate::retry::with_retry;

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(Duration::from_secs(0))
        } else if err.is_connect() {
            ProviderError::Connection(err.to_string())
        } else {
            ProviderError::ResponseError(err.to_string())
        }
    }

    async fn post(&self, path: &str, body: Value, timeout: Duration) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            if status.is_server_error() {
                return Err(ProviderError::Connection(format!("runtime returned {status}")));
            }
            return Err(ProviderError::ModelError(format!("runtime returned {status}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ProviderError::ResponseError(e.to_string()))
    }

    /// Strips a leading/trailing markdown code fence (with or without a
    /// `json` language tag) before handing text to `serde_json`.
    fn strip_json_fence(text: &str) -> &str {
        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix("```json") {
            rest.trim().trim_end_matches("```").trim()
        } else if let Some(rest) = trimmed.strip_prefix("```") {
            rest.trim().trim_end_matches("```").trim()
        } else {
            trimmed
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f64,
        timeout: Duration,
    ) -> Result<String> {
        with_retry("chat_text", || async {
            let body = json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "options": { "temperature": temperature },
            });
            let value = self.post("/api/chat", body, timeout).await?;
            value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| ProviderError::ResponseError("missing message.content".into()))
        })
        .await
    }

    async fn chat_json(
        &self,
        model: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<Value> {
        with_retry("chat_json", || async {
            let body = json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "format": "json",
                "options": { "temperature": 0.0 },
            });
            let value = self.post("/api/chat", body, timeout).await?;
            let content = value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .ok_or_else(|| ProviderError::ResponseError("missing message.content".into()))?;
            serde_json::from_str(Self::strip_json_fence(content))
                .map_err(|e| ProviderError::ResponseError(format!("non-JSON completion: {e}")))
        })
        .await
    }

    async fn chat_with_history(
        &self,
        model: &str,
        history: &[ChatMessage],
        latest: ChatMessage,
        temperature: f64,
        timeout: Duration,
    ) -> Result<String> {
        let mut messages = history.to_vec();
        messages.push(latest);
        self.chat_text(model, &messages, temperature, timeout).await
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f64,
        timeout: Duration,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "options": { "temperature": temperature },
        });

        let resp = self
            .http
            .post(self.url("/api/chat"))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !resp.status().is_success() {
            return Err(ProviderError::ModelError(format!("runtime returned {}", resp.status())));
        }

        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Self::map_send_error)?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                let parsed: Value = serde_json::from_str(&line)
                    .map_err(|e| ProviderError::ResponseError(e.to_string()))?;
                if let Some(token) = parsed.get("message").and_then(|m| m.get("content")).and_then(|c| c.as_str()) {
                    if !token.is_empty() && tx.send(StreamEvent::Token(token.to_string())).await.is_err() {
                        debug!("stream receiver dropped, aborting");
                        return Ok(());
                    }
                }
                if parsed.get("done").and_then(|d| d.as_bool()) == Some(true) {
                    let _ = tx.send(StreamEvent::Done).await;
                    return Ok(());
                }
            }
        }
        let _ = tx.send(StreamEvent::Done).await;
        Ok(())
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        with_retry("embed", || async {
            let body = json!({ "model": model, "prompt": text });
            let value = self.post("/api/embeddings", body, Duration::from_secs(30)).await?;
            let arr = value
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| ProviderError::ResponseError("missing embedding".into()))?;
            arr.iter()
                .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    ProviderError::ResponseError("non-numeric embedding component".into())
                }))
                .collect()
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let value: Value = resp.json().await.map_err(|e| ProviderError::ResponseError(e.to_string()))?;
        let models = value
            .get("models")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_markdown_fence_with_language_tag() {
        let fenced = "```json\n{\"a\":1}\n```";
        let value: Value = serde_json::from_str(OllamaClient::strip_json_fence(fenced)).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn strips_bare_json_markdown_fence() {
        let fenced = "```\n{\"a\":2}\n```";
        let value: Value = serde_json::from_str(OllamaClient::strip_json_fence(fenced)).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn leaves_unfenced_json_untouched() {
        let raw = "{\"a\":3}";
        assert_eq!(OllamaClient::strip_json_fence(raw), raw);
    }
}
