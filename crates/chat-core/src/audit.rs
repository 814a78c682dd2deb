//! Structured audit events. Each helper emits one `tracing` event with a
//! consistent set of fields so log sinks can index on them uniformly,
//! mirroring the audit-event taxonomy in the data model (§3): user
//! message, bot response, intent parsed, domain routed, context
//! retrieved, LLM call, stage timing, rate-limit trip, injection
//! attempt, tool execution, request complete.

use tracing::{info, warn};
use uuid::Uuid;

use crate::hashing::sha256_hex;

/// Truncated SHA-256 hex digest of a client network address — the sole
/// identifier used for rate-limiting and audit, never the raw address.
pub fn hash_ip(addr: &str) -> String {
    sha256_hex(addr)[..16].to_string()
}

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn log_injection_attempt(request_id: &str, ip_hash: &str, reason: &str, stage: &str) {
    warn!(
        request_id,
        ip_hash, reason, stage, event = "injection_attempt", "blocked suspected injection"
    );
}

pub fn log_rate_limit(request_id: &str, ip_hash: &str, retry_after_secs: u64) {
    warn!(
        request_id,
        ip_hash, retry_after_secs, event = "rate_limit", "request denied by rate limiter"
    );
}

pub fn log_user_message(request_id: &str, conversation_id: &str, raw: &str, sanitized: &str) {
    info!(
        request_id,
        conversation_id,
        raw_len = raw.chars().count(),
        sanitized_len = sanitized.chars().count(),
        event = "user_message",
        "received user message"
    );
}

pub fn log_bot_response(request_id: &str, conversation_id: &str, domain: &str, response: &str) {
    info!(
        request_id,
        conversation_id,
        domain,
        response_len = response.chars().count(),
        event = "bot_response",
        "delivered assistant response"
    );
}

pub fn log_intent_parsed(request_id: &str, topic: &str, question_type: &str, confidence: f64) {
    info!(
        request_id,
        topic, question_type, confidence, event = "intent_parsed", "intent parsed"
    );
}

pub fn log_domain_routed(request_id: &str, domain: &str, confidence: f64) {
    info!(request_id, domain, confidence, event = "domain_routed", "domain routed");
}

pub fn log_context_retrieved(request_id: &str, domain: &str, status: &str, quality: f64) {
    info!(
        request_id,
        domain, status, quality, event = "context_retrieved", "context retrieved"
    );
}

pub fn log_llm_call(
    request_id: &str,
    layer: &str,
    model: &str,
    purpose: &str,
    duration_ms: f64,
    success: bool,
    error: Option<&str>,
) {
    info!(
        request_id,
        layer,
        model,
        purpose,
        duration_ms,
        success,
        error = error.unwrap_or(""),
        event = "llm_call",
        "llm call completed"
    );
}

pub fn log_layer_timing(request_id: &str, layer: &str, duration_secs: f64) {
    let duration_ms = (duration_secs * 1000.0 * 100.0).round() / 100.0;
    info!(request_id, layer, duration_ms, event = "layer_timing", "stage timing");
}

pub fn log_safety_check(request_id: &str, passed: bool, issues: &[String]) {
    info!(
        request_id,
        passed,
        issues = issues.join(","),
        event = "safety_check",
        "safety check outcome"
    );
}

pub fn log_tool_execution(request_id: &str, tool: &str, success: bool) {
    info!(request_id, tool, success, event = "tool_execution", "tool executed");
}

pub fn log_request_complete(
    request_id: &str,
    conversation_id: &str,
    success: bool,
    blocked_at_layer: Option<&str>,
    response_time_ms: f64,
) {
    info!(
        request_id,
        conversation_id,
        success,
        blocked_at_layer = blocked_at_layer.unwrap_or(""),
        response_time_ms,
        event = "request_complete",
        "request complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ip_is_stable_and_truncated() {
        let a = hash_ip("127.0.0.1");
        let b = hash_ip("127.0.0.1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_ip_differs_for_different_addresses() {
        assert_ne!(hash_ip("1.2.3.4"), hash_ip("5.6.7.8"));
    }
}
