//! L3 — intent parser: topic, question-type, entities, tone, confidence.

use std::time::Duration;

use chat_core::types::{Intent, QuestionType, Topic};
use chat_llm::{ChatMessage, LlmClient, ProviderError};
use serde::Deserialize;

#[derive(Deserialize)]
struct RawIntent {
    topic: String,
    question_type: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default = "default_tone")]
    emotional_tone: String,
    #[serde(default)]
    confidence: f64,
}

fn default_tone() -> String {
    "neutral".to_string()
}

const SYSTEM_PROMPT: &str = "Classify the user's message. Output JSON {\"topic\":string,\
\"question_type\":string,\"entities\":[string],\"emotional_tone\":string,\"confidence\":number} only.";

pub fn build_prompt(message: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(message)]
}

pub async fn parse_intent(
    client: &dyn LlmClient,
    model: &str,
    message: &str,
    timeout: Duration,
) -> Result<Intent, ProviderError> {
    let messages = build_prompt(message);
    let value = client.chat_json(model, &messages, timeout).await?;
    let raw: RawIntent =
        serde_json::from_value(value).map_err(|e| ProviderError::ResponseError(e.to_string()))?;

    let intent = Intent {
        topic: raw.topic.parse::<Topic>().unwrap_or(Topic::General),
        question_type: raw.question_type.parse::<QuestionType>().unwrap_or(QuestionType::Ambiguous),
        entities: raw.entities,
        emotional_tone: raw.emotional_tone,
        confidence: raw.confidence.clamp(0.0, 1.0),
    };
    Ok(intent.normalize_low_confidence())
}
