//! L9 — response assembly. Never puts raw context, intent JSON, or stage
//! internals into the record handed back to the caller; emits exactly
//! one "request complete" audit event per request.

use chat_core::audit;
use chat_core::error::ChatError;
use chat_core::types::{ChatResponse, ErrorBody, LayerTimingsMs, ResponseBody, ResponseMetadata};

/// A slightly longer canned explanation per error code, for surfaces that
/// want more than the short `ChatError::user_message()` sentence. Purely
/// additive — never required by callers that only read `error.message`.
pub fn long_explanation(code: &str) -> &'static str {
    match code {
        "rate_limited" => {
            "You've sent quite a few messages in a short window. The limit resets automatically; \
             please wait a minute before trying again."
        }
        "input_too_long" => {
            "Messages are capped at a fixed length so the assistant can respond quickly. Try \
             splitting your question into smaller parts."
        }
        "blocked_input" => {
            "That message looked like an attempt to manipulate the assistant's instructions \
             rather than a genuine question, so it was not processed."
        }
        "safety_failed" => {
            "The drafted response didn't pass an automated safety check, so it was replaced with \
             a safer fallback. Feel free to ask again, perhaps phrased differently."
        }
        "internal_error" => {
            "Something unexpected happened while handling the request. This has been logged; \
             please try again shortly."
        }
        _ => "An error occurred while handling the request.",
    }
}

pub fn success(
    request_id: String,
    conversation_id: String,
    content: String,
    domain: &str,
    response_time_ms: f64,
    layer_timings_ms: LayerTimingsMs,
) -> ChatResponse {
    audit::log_bot_response(&request_id, &conversation_id, domain, &content);
    audit::log_request_complete(&request_id, &conversation_id, true, None, response_time_ms);

    metrics::counter!("chat_requests_total", "outcome" => "success", "domain" => domain.to_string())
        .increment(1);
    metrics::histogram!("chat_response_time_ms", "outcome" => "success").record(response_time_ms);

    ChatResponse {
        success: true,
        response: Some(ResponseBody { content, domain: domain.to_string() }),
        error: None,
        metadata: ResponseMetadata { request_id, response_time_ms, conversation_id, layer_timings_ms },
    }
}

pub fn failure(
    request_id: String,
    conversation_id: String,
    error: &ChatError,
    blocked_at_layer: Option<&str>,
    response_time_ms: f64,
    layer_timings_ms: LayerTimingsMs,
) -> ChatResponse {
    audit::log_request_complete(&request_id, &conversation_id, false, blocked_at_layer, response_time_ms);

    metrics::counter!("chat_requests_total", "outcome" => "blocked", "code" => error.code().to_string())
        .increment(1);
    metrics::histogram!("chat_response_time_ms", "outcome" => "blocked").record(response_time_ms);

    ChatResponse {
        success: false,
        response: None,
        error: Some(ErrorBody { code: error.code().to_string(), message: error.user_message() }),
        metadata: ResponseMetadata { request_id, response_time_ms, conversation_id, layer_timings_ms },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn success_response_carries_domain_and_content() {
        let response = success(
            "req-1".into(),
            "conv-1".into(),
            "hello there".into(),
            "meta",
            12.5,
            HashMap::new(),
        );
        assert!(response.success);
        assert_eq!(response.response.unwrap().domain, "meta");
        assert!(response.error.is_none());
    }

    #[test]
    fn failure_response_never_exposes_internal_message() {
        let response = failure(
            "req-2".into(),
            "conv-2".into(),
            &ChatError::Internal("db connection refused on port 5432".into()),
            Some("L6"),
            5.0,
            HashMap::new(),
        );
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, "internal_error");
        assert!(!error.message.contains("5432"));
    }

    #[test]
    fn every_error_code_has_a_long_explanation() {
        for code in ["rate_limited", "input_too_long", "blocked_input", "safety_failed", "internal_error"] {
            assert!(!long_explanation(code).is_empty());
        }
    }
}
