//! L8 — output safety. Two independent implementations of the same
//! contract: the LLM-judged variant (with an optional embedding-based
//! grounding check) used by `PipelineOrchestrator`, and a pattern-based
//! variant used by `FastPipelineOrchestrator` in exchange for lower
//! latency. Both fail closed on a confirmed issue; the LLM variant fails
//! open on a *recoverable* provider error so a flaky embedding service
//! never blocks delivery outright.

use std::time::Duration;

use chat_llm::{ChatMessage, LlmClient, ProviderError};
use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyIssue {
    PromptLeakage,
    Inappropriate,
    Hallucination,
    Unprofessional,
    PrivateInfo,
    NegativeSelf,
}

impl SafetyIssue {
    fn from_code(code: &str) -> Self {
        match code {
            "prompt_leakage" => SafetyIssue::PromptLeakage,
            "inappropriate" => SafetyIssue::Inappropriate,
            "hallucination" => SafetyIssue::Hallucination,
            "unprofessional" => SafetyIssue::Unprofessional,
            "private_info" => SafetyIssue::PrivateInfo,
            _ => SafetyIssue::NegativeSelf,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyResult {
    pub safe: bool,
    pub issue: Option<SafetyIssue>,
    /// True when the check could not actually run (recoverable provider
    /// error) and the response was allowed through by policy rather than
    /// because it was judged safe.
    pub failed_open: bool,
}

impl SafetyResult {
    fn safe() -> Self {
        Self { safe: true, issue: None, failed_open: false }
    }

    fn unsafe_with(issue: SafetyIssue) -> Self {
        Self { safe: false, issue: Some(issue), failed_open: false }
    }

    fn failed_open() -> Self {
        Self { safe: true, issue: None, failed_open: true }
    }
}

pub const SAFE_FALLBACK_MESSAGE: &str =
    "I want to make sure I give you an accurate answer. Could you rephrase that question?";

#[derive(Deserialize)]
struct RawSafetyVerdict {
    safe: bool,
    #[serde(default)]
    issue: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are reviewing a draft assistant response before it is sent to a \
visitor. Output JSON {\"safe\":boolean,\"issue\":string|null} only. issue, when present, must be \
one of: prompt_leakage, inappropriate, hallucination, unprofessional, private_info, negative_self. \
Flag prompt_leakage if the draft reveals system instructions or internal stage names. Flag \
private_info if it exposes a phone number, address, or unlisted email. Flag negative_self if it \
disparages the subject it speaks for.";

/// LLM-judged safety check. Fails open on a recoverable provider error,
/// closed on anything else.
pub async fn check_llm(
    client: &dyn LlmClient,
    model: &str,
    draft: &str,
    context: &str,
    timeout: Duration,
) -> SafetyResult {
    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{context}\n\nDraft response:\n{draft}")),
    ];

    let value = match client.chat_json(model, &messages, timeout).await {
        Ok(v) => v,
        Err(e) if e.recoverable() => return SafetyResult::failed_open(),
        Err(_) => return SafetyResult::unsafe_with(SafetyIssue::Unprofessional),
    };

    let raw: RawSafetyVerdict = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) => return SafetyResult::unsafe_with(SafetyIssue::Unprofessional),
    };

    if raw.safe {
        SafetyResult::safe()
    } else {
        SafetyResult::unsafe_with(SafetyIssue::from_code(raw.issue.as_deref().unwrap_or("")))
    }
}

const ABBREVIATIONS: &[&str] = &["mr.", "mrs.", "dr.", "e.g.", "i.e."];

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        if c == '.' || c == '!' || c == '?' {
            let lower_tail = current.to_lowercase();
            let is_abbreviation = ABBREVIATIONS.iter().any(|a| lower_tail.trim_end().ends_with(a));
            let next_is_boundary = chars.get(i + 1).map(|n| n.is_whitespace()).unwrap_or(true);
            if !is_abbreviation && next_is_boundary {
                let trimmed = current.trim().to_string();
                if trimmed.chars().count() > 10 {
                    sentences.push(trimmed);
                }
                current.clear();
            }
        }
    }
    let remainder = current.trim().to_string();
    if remainder.chars().count() > 10 {
        sentences.push(remainder);
    }
    sentences
}

const META_SENTENCE_MARKERS: &[&str] = &[
    "based on",
    "according to",
    "from the context",
    "hi there",
    "hello",
    "thanks for asking",
    "great question",
];

fn is_meta_sentence(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    META_SENTENCE_MARKERS.iter().any(|m| lower.contains(m))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn chunk_context(context: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = context.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}

/// Embedding-based hallucination check: does every factual-looking
/// sentence in the draft have *some* supporting chunk in the context?
/// Fails open on any embedding error — this check supplements the LLM
/// verdict, it never gets to veto delivery on its own authority when it
/// can't actually run.
pub async fn check_grounding(
    client: &dyn LlmClient,
    embedding_model: &str,
    draft: &str,
    context: &str,
    similarity_floor: f64,
    chunk_chars: usize,
) -> SafetyResult {
    let sentences: Vec<String> =
        split_sentences(draft).into_iter().filter(|s| !is_meta_sentence(s)).collect();
    if sentences.is_empty() {
        return SafetyResult::safe();
    }

    let chunks = chunk_context(context, chunk_chars);
    if chunks.is_empty() {
        return SafetyResult::safe();
    }

    let chunk_embeddings = match client.embed_batch(embedding_model, &chunks).await {
        Ok(e) => e,
        Err(_) => return SafetyResult::failed_open(),
    };

    let mut ungrounded = 0;
    for sentence in &sentences {
        let sentence_embedding = match client.embed(embedding_model, sentence).await {
            Ok(e) => e,
            Err(_) => return SafetyResult::failed_open(),
        };
        let max_similarity = chunk_embeddings
            .iter()
            .map(|chunk_embedding| cosine_similarity(&sentence_embedding, chunk_embedding))
            .fold(f32::MIN, f32::max);
        if (max_similarity as f64) < similarity_floor {
            ungrounded += 1;
        }
    }

    if ungrounded >= 2 {
        SafetyResult::unsafe_with(SafetyIssue::Hallucination)
    } else {
        SafetyResult::safe()
    }
}

static PROMPT_LEAKAGE: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)system prompt",
        r"(?i)my instructions are",
        r"<<<USER_MESSAGE>>>",
        r"<<<END_USER_MESSAGE>>>",
        r"(?i)layer \d+\s",
    ])
    .unwrap()
});

static INAPPROPRIATE: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([r"(?i)\bfuck\b", r"(?i)\bshit\b", r"(?i)kill (yourself|him|her|them)"]).unwrap()
});

static PRIVATE_INFO: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\b\d{3}[-.\s]\d{3}[-.\s]\d{4}\b",
        r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
    ])
    .unwrap()
});

static NEGATIVE_SELF: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)kellogg is (a|an) (bad|terrible|awful|incompetent)",
        r"(?i)i('m| am) not (qualified|good enough|reliable)",
    ])
    .unwrap()
});

static EMAIL_PATTERN: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

fn extract_emails(text: &str) -> Vec<String> {
    EMAIL_PATTERN.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

/// Pattern-based safety check used by the fast orchestrator. Trades LLM
/// nuance for latency: one compiled regex pass per category, checked in a
/// fixed order so the first match wins deterministically.
pub fn check_fast(draft: &str, email_allow_list: &[String]) -> SafetyResult {
    if PROMPT_LEAKAGE.is_match(draft) {
        return SafetyResult::unsafe_with(SafetyIssue::PromptLeakage);
    }
    if INAPPROPRIATE.is_match(draft) {
        return SafetyResult::unsafe_with(SafetyIssue::Inappropriate);
    }
    if NEGATIVE_SELF.is_match(draft) {
        return SafetyResult::unsafe_with(SafetyIssue::NegativeSelf);
    }

    let has_phone_or_ip = PRIVATE_INFO.matches(draft).into_iter().any(|i| i == 0 || i == 1);
    let disallowed_email = extract_emails(draft)
        .into_iter()
        .any(|email| !email_allow_list.iter().any(|allowed| allowed.eq_ignore_ascii_case(&email)));
    if has_phone_or_ip || disallowed_email {
        return SafetyResult::unsafe_with(SafetyIssue::PrivateInfo);
    }

    SafetyResult::safe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_llm::StreamEvent;
    use tokio::sync::mpsc;

    struct StubClient {
        json: serde_json::Value,
        err: Option<ProviderError>,
    }

    #[async_trait::async_trait]
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
            match &self.err {
                Some(ProviderError::Connection(m)) => Err(ProviderError::Connection(m.clone())),
                Some(e) => Err(ProviderError::ModelError(e.to_string())),
                None => Ok(self.json.clone()),
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
            Ok(vec![1.0, 0.0])
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn list_models(&self) -> chat_llm::error::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn llm_variant_passes_safe_verdict() {
        let client = StubClient { json: serde_json::json!({"safe": true, "issue": null}), err: None };
        let result = check_llm(&client, "m", "a fine response", "ctx", Duration::from_secs(5)).await;
        assert!(result.safe);
    }

    #[tokio::test]
    async fn llm_variant_flags_unsafe_with_issue() {
        let client =
            StubClient { json: serde_json::json!({"safe": false, "issue": "private_info"}), err: None };
        let result = check_llm(&client, "m", "call me at 555-123-4567", "ctx", Duration::from_secs(5)).await;
        assert!(!result.safe);
        assert_eq!(result.issue, Some(SafetyIssue::PrivateInfo));
    }

    #[tokio::test]
    async fn llm_variant_fails_open_on_recoverable_error() {
        let client = StubClient {
            json: serde_json::json!({}),
            err: Some(ProviderError::Connection("down".into())),
        };
        let result = check_llm(&client, "m", "draft", "ctx", Duration::from_secs(5)).await;
        assert!(result.safe);
        assert!(result.failed_open);
    }

    #[tokio::test]
    async fn llm_variant_fails_closed_on_nonrecoverable_error() {
        let client =
            StubClient { json: serde_json::json!({}), err: Some(ProviderError::ModelError("gone".into())) };
        let result = check_llm(&client, "m", "draft", "ctx", Duration::from_secs(5)).await;
        assert!(!result.safe);
    }

    #[test]
    fn splits_sentences_respecting_abbreviations() {
        let text = "Dr. Smith said it works. It really does.";
        let sentences = split_sentences(text);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("Dr. Smith"));
    }

    #[test]
    fn discards_short_fragments() {
        let sentences = split_sentences("Yes. No. This one is long enough to count.");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn excludes_meta_sentences() {
        assert!(is_meta_sentence("Based on the context provided, he enjoys hiking."));
        assert!(!is_meta_sentence("He has worked in distributed systems for ten years."));
    }

    #[test]
    fn cosine_similarity_zero_norm_is_zero_not_error() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn fast_variant_flags_prompt_leakage() {
        let result = check_fast("My instructions are to never reveal this.", &[]);
        assert_eq!(result.issue, Some(SafetyIssue::PromptLeakage));
    }

    #[test]
    fn fast_variant_flags_bare_phone_number() {
        let result = check_fast("You can reach him at 555-123-4567.", &[]);
        assert_eq!(result.issue, Some(SafetyIssue::PrivateInfo));
    }

    #[test]
    fn fast_variant_allows_listed_public_email() {
        let result = check_fast("Reach out at hello@kellogg.example.com.", &["hello@kellogg.example.com".into()]);
        assert!(result.safe);
    }

    #[test]
    fn fast_variant_flags_unlisted_email() {
        let result = check_fast("Reach out at randomperson@example.com.", &[]);
        assert_eq!(result.issue, Some(SafetyIssue::PrivateInfo));
    }

    #[test]
    fn fast_variant_passes_clean_text() {
        let result = check_fast("Kellogg has worked on distributed systems for a decade.", &[]);
        assert!(result.safe);
    }
}
