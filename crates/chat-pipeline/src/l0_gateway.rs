//! L0 — network gateway: content-type, size, and rate-limit checks that
//! run before any compute.

use chat_core::ratelimit::RateLimiter;
use chat_core::types::RequestEnvelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayReject {
    InvalidContentType,
    RequestTooLarge,
    RateLimited { retry_after_secs: u64 },
    MissingMessage,
}

pub struct GatewayResult {
    pub passed: bool,
    pub reject: Option<GatewayReject>,
}

impl GatewayResult {
    fn ok() -> Self {
        Self { passed: true, reject: None }
    }

    fn reject(reason: GatewayReject) -> Self {
        Self { passed: false, reject: Some(reason) }
    }
}

pub fn check(
    envelope: &RequestEnvelope,
    max_request_bytes: u64,
    rate_limiter: &RateLimiter,
    address_hash: &str,
) -> GatewayResult {
    if let Some(ct) = &envelope.content_type {
        let media_type = ct.split(';').next().unwrap_or("").trim().to_lowercase();
        if !media_type.is_empty() && media_type != "application/json" {
            return GatewayResult::reject(GatewayReject::InvalidContentType);
        }
    }

    if let Some(len) = envelope.content_length {
        if len > max_request_bytes {
            return GatewayResult::reject(GatewayReject::RequestTooLarge);
        }
    }

    let decision = rate_limiter.check_and_record(address_hash);
    if !decision.allowed {
        return GatewayResult::reject(GatewayReject::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    if envelope.raw_message.trim().is_empty() {
        return GatewayResult::reject(GatewayReject::MissingMessage);
    }

    GatewayResult::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::config::RateLimits;

    fn envelope(message: &str) -> RequestEnvelope {
        RequestEnvelope {
            request_id: "r1".into(),
            conversation_id: None,
            peer_addr: "127.0.0.1".into(),
            content_type: Some("application/json".into()),
            content_length: Some(64),
            raw_message: message.into(),
        }
    }

    #[test]
    fn rejects_non_json_content_type() {
        let limiter = RateLimiter::new(RateLimits::default());
        let mut env = envelope("hello");
        env.content_type = Some("text/plain".into());
        let result = check(&env, 8192, &limiter, "hash1");
        assert_eq!(result.reject, Some(GatewayReject::InvalidContentType));
    }

    #[test]
    fn rejects_oversized_body() {
        let limiter = RateLimiter::new(RateLimits::default());
        let mut env = envelope("hello");
        env.content_length = Some(100_000);
        let result = check(&env, 8192, &limiter, "hash2");
        assert_eq!(result.reject, Some(GatewayReject::RequestTooLarge));
    }

    #[test]
    fn rejects_empty_message() {
        let limiter = RateLimiter::new(RateLimits::default());
        let env = envelope("   ");
        let result = check(&env, 8192, &limiter, "hash3");
        assert_eq!(result.reject, Some(GatewayReject::MissingMessage));
    }

    #[test]
    fn passes_well_formed_request() {
        let limiter = RateLimiter::new(RateLimits::default());
        let env = envelope("hello there");
        let result = check(&env, 8192, &limiter, "hash4");
        assert!(result.passed);
    }
}
