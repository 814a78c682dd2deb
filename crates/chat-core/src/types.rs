//! Shared domain types that cross crate boundaries: intent/domain
//! enumerations, the request envelope, and response/metadata shapes
//! returned through L9.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Topic tag produced by L3 (or the fused L2+L3 classifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    WorkExperience,
    Skills,
    Projects,
    Hobbies,
    Philosophy,
    Contact,
    Message,
    ChatSystem,
    General,
    Greeting,
}

impl std::str::FromStr for Topic {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace(' ', "_");
        Ok(match normalized.as_str() {
            "work_experience" => Topic::WorkExperience,
            "skills" => Topic::Skills,
            "projects" => Topic::Projects,
            "hobbies" => Topic::Hobbies,
            "philosophy" => Topic::Philosophy,
            "contact" => Topic::Contact,
            "message" => Topic::Message,
            "chat_system" => Topic::ChatSystem,
            "greeting" => Topic::Greeting,
            _ => Topic::General,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Factual,
    Experience,
    Opinion,
    Comparison,
    Procedural,
    Clarification,
    Greeting,
    Ambiguous,
    Action,
}

impl std::str::FromStr for QuestionType {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace(' ', "_");
        Ok(match normalized.as_str() {
            "factual" => QuestionType::Factual,
            "experience" => QuestionType::Experience,
            "opinion" => QuestionType::Opinion,
            "comparison" => QuestionType::Comparison,
            "procedural" => QuestionType::Procedural,
            "clarification" => QuestionType::Clarification,
            "greeting" => QuestionType::Greeting,
            "action" => QuestionType::Action,
            _ => QuestionType::Ambiguous,
        })
    }
}

/// Output of L3 (or the fused classifier's intent half).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub topic: Topic,
    pub question_type: QuestionType,
    pub entities: Vec<String>,
    pub emotional_tone: String,
    pub confidence: f64,
}

impl Intent {
    /// Confidence below 0.3 degrades the result to ambiguous/neutral but
    /// never blocks — routing (L4) handles ambiguity.
    pub fn normalize_low_confidence(mut self) -> Self {
        if self.confidence < 0.3 {
            self.question_type = QuestionType::Ambiguous;
            self.emotional_tone = "neutral".to_string();
        }
        self
    }
}

/// Domain assigned by L4; drives L5's file selection and L6's fallback copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Professional,
    Projects,
    Hobbies,
    Philosophy,
    Linkedin,
    Meta,
    OutOfScope,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Professional => "professional",
            Domain::Projects => "projects",
            Domain::Hobbies => "hobbies",
            Domain::Philosophy => "philosophy",
            Domain::Linkedin => "linkedin",
            Domain::Meta => "meta",
            Domain::OutOfScope => "out_of_scope",
        }
    }
}

/// One sanitized request, created at ingress and consumed by the orchestrator.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub conversation_id: Option<String>,
    pub peer_addr: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub raw_message: String,
}

/// Per-stage wall-clock timings, keyed "L0".."L9".
pub type LayerTimingsMs = HashMap<String, f64>;

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub response_time_ms: f64,
    pub conversation_id: String,
    pub layer_timings_ms: LayerTimingsMs,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseBody {
    pub content: String,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_topic_degrades_to_general() {
        assert_eq!("frobnicate".parse::<Topic>().unwrap(), Topic::General);
    }

    #[test]
    fn low_confidence_intent_becomes_ambiguous() {
        let intent = Intent {
            topic: Topic::Skills,
            question_type: QuestionType::Factual,
            entities: vec![],
            emotional_tone: "curious".into(),
            confidence: 0.1,
        }
        .normalize_low_confidence();
        assert_eq!(intent.question_type, QuestionType::Ambiguous);
        assert_eq!(intent.emotional_tone, "neutral");
    }
}
