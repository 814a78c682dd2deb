//! Sliding-window in-memory rate limiting: per-hashed-address per-minute
//! and per-hour windows, plus one process-global per-minute window.
//! Guarded by a single mutex with short critical sections; opportunistically
//! cleaned every 60s rather than on a dedicated background timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimits;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const ONE_HOUR: Duration = Duration::from_secs(3600);
const ONE_MINUTE: Duration = Duration::from_secs(60);

struct Windows {
    /// Per-address request timestamps, newest-agnostic order (pushed at the back).
    per_address: HashMap<String, Vec<Instant>>,
    global: Vec<Instant>,
    last_cleanup: Instant,
}

pub struct RateLimiter {
    limits: RateLimits,
    state: Mutex<Windows>,
}

/// Outcome of a rate-limit check.
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the oldest offending timestamp slides out of window.
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(Windows {
                per_address: HashMap::new(),
                global: Vec::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Check and, if allowed, record the request. Matches the Python
    /// reference's check-then-record sequencing inside one critical section
    /// so a racing request can't slip past the limit between the two steps.
    pub fn check_and_record(&self, address_hash: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        if now.duration_since(state.last_cleanup) >= CLEANUP_INTERVAL {
            Self::cleanup(&mut state, now);
            state.last_cleanup = now;
        }

        let entry = state.per_address.entry(address_hash.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < ONE_HOUR);
        state.global.retain(|t| now.duration_since(*t) < ONE_MINUTE);

        let per_minute_count = entry.iter().filter(|t| now.duration_since(**t) < ONE_MINUTE).count() as u64;
        let per_hour_count = entry.len() as u64;
        let global_count = state.global.len() as u64;

        if per_minute_count >= self.limits.per_ip_per_minute {
            let retry_after = Self::retry_after(entry, now, ONE_MINUTE);
            return RateLimitDecision {
                allowed: false,
                retry_after_secs: retry_after,
            };
        }
        if per_hour_count >= self.limits.per_ip_per_hour {
            let retry_after = Self::retry_after(entry, now, ONE_HOUR);
            return RateLimitDecision {
                allowed: false,
                retry_after_secs: retry_after,
            };
        }
        if global_count >= self.limits.global_per_minute {
            let retry_after = Self::retry_after(&state.global.clone(), now, ONE_MINUTE);
            return RateLimitDecision {
                allowed: false,
                retry_after_secs: retry_after,
            };
        }

        entry.push(now);
        state.global.push(now);
        RateLimitDecision {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    fn retry_after(window: &[Instant], now: Instant, period: Duration) -> u64 {
        let oldest = window
            .iter()
            .filter(|t| now.duration_since(**t) < period)
            .min()
            .copied();
        match oldest {
            Some(t) => {
                let elapsed = now.duration_since(t);
                period.saturating_sub(elapsed).as_secs().max(1)
            }
            None => 1,
        }
    }

    fn cleanup(state: &mut Windows, now: Instant) {
        state.per_address.retain(|_, v| {
            v.retain(|t| now.duration_since(*t) < ONE_HOUR);
            !v.is_empty()
        });
        state.global.retain(|t| now.duration_since(*t) < ONE_MINUTE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(RateLimits {
            per_ip_per_minute: 2,
            per_ip_per_hour: 100,
            global_per_minute: 1000,
        });
        assert!(limiter.check_and_record("addr").allowed);
        assert!(limiter.check_and_record("addr").allowed);
        let third = limiter.check_and_record("addr");
        assert!(!third.allowed);
        assert!(third.retry_after_secs > 0 && third.retry_after_secs <= 60);
    }

    #[test]
    fn different_addresses_are_independent() {
        let limiter = RateLimiter::new(RateLimits {
            per_ip_per_minute: 1,
            per_ip_per_hour: 100,
            global_per_minute: 1000,
        });
        assert!(limiter.check_and_record("a").allowed);
        assert!(limiter.check_and_record("b").allowed);
    }
}
