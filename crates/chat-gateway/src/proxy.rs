//! Proxy-aware client-address extraction (§6). Forwarded headers are
//! never trusted unless the immediate peer is itself an allow-listed
//! proxy — otherwise a request coming straight from the internet could
//! spoof its own `X-Forwarded-For` and dodge rate limiting.

use axum::http::HeaderMap;
use std::net::SocketAddr;

fn is_trusted(peer_ip: &str, trusted_proxies: &[String]) -> bool {
    trusted_proxies.iter().any(|p| p == peer_ip)
}

fn first_forwarded_entry(value: &str) -> Option<&str> {
    value.split(',').next().map(str::trim).filter(|s| !s.is_empty())
}

/// Resolves the address to hash and rate-limit on. Falls back to the
/// direct peer whenever the peer isn't a configured trusted proxy, or
/// when no forwarding header is present.
pub fn client_address(peer: SocketAddr, headers: &HeaderMap, trusted_proxies: &[String]) -> String {
    let peer_ip = peer.ip().to_string();
    if trusted_proxies.is_empty() || !is_trusted(&peer_ip, trusted_proxies) {
        return peer_ip;
    }

    if let Some(cf_ip) = headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok()) {
        let cf_ip = cf_ip.trim();
        if !cf_ip.is_empty() {
            return cf_ip.to_string();
        }
    }

    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(leftmost) = first_forwarded_entry(xff) {
            return leftmost.to_string();
        }
    }

    peer_ip
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer(ip: &str) -> SocketAddr {
        format!("{ip}:12345").parse().unwrap()
    }

    #[test]
    fn untrusted_peer_is_used_directly_even_with_forwarding_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        let addr = client_address(peer("9.9.9.9"), &headers, &[]);
        assert_eq!(addr, "9.9.9.9");
    }

    #[test]
    fn trusted_proxy_forwards_cf_connecting_ip_first() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.2.3.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("5.6.7.8"));
        let addr = client_address(peer("10.0.0.1"), &headers, &["10.0.0.1".into()]);
        assert_eq!(addr, "1.2.3.4");
    }

    #[test]
    fn trusted_proxy_falls_back_to_leftmost_xff_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        let addr = client_address(peer("10.0.0.1"), &headers, &["10.0.0.1".into()]);
        assert_eq!(addr, "1.2.3.4");
    }

    #[test]
    fn trusted_proxy_with_no_forwarding_headers_uses_peer() {
        let headers = HeaderMap::new();
        let addr = client_address(peer("10.0.0.1"), &headers, &["10.0.0.1".into()]);
        assert_eq!(addr, "10.0.0.1");
    }
}
