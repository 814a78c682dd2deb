//! L7 — self-revision. A quality pass, not a safety one: revision
//! failures fall through transparently and never block a request.

use std::time::Duration;

use chat_llm::{ChatMessage, LlmClient};
use serde::Deserialize;

const MIN_DRAFT_LEN_FOR_REVISION: usize = 200;
const MIN_ACCEPTED_REVISION_LEN: usize = 50;

#[derive(Deserialize)]
struct RawRevision {
    needs_revision: bool,
    #[serde(default)]
    #[allow(dead_code)]
    issues: Vec<String>,
    #[serde(default)]
    revised_response: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are reviewing a draft response for clarity and accuracy against \
its source context. Output JSON {\"needs_revision\":boolean,\"issues\":[string],\
\"revised_response\":string|null} only. If the draft is already good, set needs_revision to \
false and leave revised_response null.";

fn build_prompt(draft: &str, context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Original question: {question}\n\nContext (truncated):\n{context}\n\nDraft response:\n{draft}"
        )),
    ]
}

/// Returns the (possibly unchanged) response text. Never errors: any
/// failure mode — skip threshold, LLM error, malformed JSON, too-short
/// revision — resolves to returning `draft` untouched.
pub async fn revise(
    client: &dyn LlmClient,
    model: &str,
    draft: &str,
    context: &str,
    question: &str,
    context_truncate_chars: usize,
    timeout: Duration,
) -> String {
    if draft.chars().count() < MIN_DRAFT_LEN_FOR_REVISION {
        return draft.to_string();
    }

    let truncated_context: String = context.chars().take(context_truncate_chars).collect();
    let messages = build_prompt(draft, &truncated_context, question);

    let value = match client.chat_json(model, &messages, timeout).await {
        Ok(v) => v,
        Err(_) => return draft.to_string(),
    };

    let raw: Result<RawRevision, _> = serde_json::from_value(value);
    let Ok(raw) = raw else {
        return draft.to_string();
    };

    if !raw.needs_revision {
        return draft.to_string();
    }

    match raw.revised_response {
        Some(revised) if revised.chars().count() >= MIN_ACCEPTED_REVISION_LEN => revised,
        _ => draft.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_llm::{ProviderError, StreamEvent};
    use tokio::sync::mpsc;

    struct StubClient {
        json: serde_json::Value,
        error: bool,
    }

    #[async_trait]
    impl LlmClient for StubClient {
        async fn chat_text(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f64,
            _timeout: Duration,
        ) -> chat_llm::error::Result<String> {
            Ok(String::new())
        }

        async fn chat_json(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _timeout: Duration,
        ) -> chat_llm::error::Result<serde_json::Value> {
            if self.error {
                Err(ProviderError::ModelError("boom".into()))
            } else {
                Ok(self.json.clone())
            }
        }

        async fn chat_with_history(
            &self,
            _model: &str,
            _history: &[ChatMessage],
            _latest: ChatMessage,
            _temperature: f64,
            _timeout: Duration,
        ) -> chat_llm::error::Result<String> {
            Ok(String::new())
        }

        async fn chat_stream(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f64,
            _timeout: Duration,
            _tx: mpsc::Sender<StreamEvent>,
        ) -> chat_llm::error::Result<()> {
            Ok(())
        }

        async fn embed(&self, _model: &str, _text: &str) -> chat_llm::error::Result<Vec<f32>> {
            Ok(vec![])
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn list_models(&self) -> chat_llm::error::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn long_draft() -> String {
        "a".repeat(250)
    }

    #[tokio::test]
    async fn short_draft_skips_revision_entirely() {
        let client = StubClient { json: serde_json::json!({}), error: false };
        let draft = "too short";
        let result = revise(&client, "m", draft, "ctx", "q", 1000, Duration::from_secs(5)).await;
        assert_eq!(result, draft);
    }

    #[tokio::test]
    async fn llm_error_falls_through_to_original_draft() {
        let client = StubClient { json: serde_json::json!({}), error: true };
        let draft = long_draft();
        let result = revise(&client, "m", &draft, "ctx", "q", 1000, Duration::from_secs(5)).await;
        assert_eq!(result, draft);
    }

    #[tokio::test]
    async fn no_revision_needed_returns_original() {
        let client = StubClient { json: serde_json::json!({"needs_revision": false}), error: false };
        let draft = long_draft();
        let result = revise(&client, "m", &draft, "ctx", "q", 1000, Duration::from_secs(5)).await;
        assert_eq!(result, draft);
    }

    #[tokio::test]
    async fn accepts_sufficiently_long_revision() {
        let revised = "b".repeat(60);
        let client = StubClient {
            json: serde_json::json!({"needs_revision": true, "issues": ["vague"], "revised_response": revised}),
            error: false,
        };
        let draft = long_draft();
        let result = revise(&client, "m", &draft, "ctx", "q", 1000, Duration::from_secs(5)).await;
        assert_eq!(result.chars().count(), 60);
    }

    #[tokio::test]
    async fn rejects_too_short_revision_and_keeps_original() {
        let client = StubClient {
            json: serde_json::json!({"needs_revision": true, "issues": [], "revised_response": "short"}),
            error: false,
        };
        let draft = long_draft();
        let result = revise(&client, "m", &draft, "ctx", "q", 1000, Duration::from_secs(5)).await;
        assert_eq!(result, draft);
    }
}
