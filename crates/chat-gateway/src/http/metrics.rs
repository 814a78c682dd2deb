//! GET /metrics — Prometheus exposition text, gated twice: the route is
//! only mounted at all when `server.metrics_enabled` is set (see
//! `app::build_router`), and every request is additionally checked
//! against a localhost-or-trusted-proxy allowlist here, since a scrape
//! endpoint left open to the internet leaks request-volume and timing
//! information about every stage.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::app::AppState;

fn is_allowed(peer: SocketAddr, trusted_proxies: &[String]) -> bool {
    if peer.ip().is_loopback() {
        return true;
    }
    trusted_proxies.iter().any(|p| p == &peer.ip().to_string())
}

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> axum::response::Response {
    if !is_allowed(peer, &state.config.server.trusted_proxies) {
        return StatusCode::FORBIDDEN.into_response();
    }

    state.metrics_handle.render().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_peer_is_always_allowed() {
        let peer: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        assert!(is_allowed(peer, &[]));
    }

    #[test]
    fn non_loopback_peer_requires_allowlist_membership() {
        let peer: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        assert!(!is_allowed(peer, &[]));
        assert!(is_allowed(peer, &["10.0.0.5".to_string()]));
    }
}
