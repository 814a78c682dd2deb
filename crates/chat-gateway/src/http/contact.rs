//! POST /contact — direct-to-storage visitor message submission. Runs
//! through the same deterministic L1 sanitizer as chat messages but
//! never touches the LLM pipeline; it's a plain contact form backed by
//! the flat-file contact store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use chat_core::audit;
use chat_core::sanitize::{sanitize, SanitizeError};

use crate::app::AppState;
use crate::proxy::client_address;

#[derive(Deserialize)]
pub struct ContactRequest {
    pub message: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Serialize)]
pub struct ContactResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ContactRequest>,
) -> Json<ContactResponse> {
    let address = client_address(peer, &headers, &state.config.server.trusted_proxies);
    let ip_hash = audit::hash_ip(&address);

    let sanitized = match sanitize(&req.message, &state.config.security) {
        Ok(s) => s,
        Err(SanitizeError::EmptyInput) => {
            return Json(ContactResponse { success: false, message_id: None, error: Some("message cannot be empty".into()) });
        }
        Err(SanitizeError::TooLong) => {
            return Json(ContactResponse { success: false, message_id: None, error: Some("message is too long".into()) });
        }
        Err(SanitizeError::BlockedPattern(_)) => {
            return Json(ContactResponse {
                success: false,
                message_id: None,
                error: Some("message could not be processed".into()),
            });
        }
    };

    match state.contact_storage.store(
        sanitized,
        req.sender_name,
        req.sender_email,
        req.context,
        Some(ip_hash),
        req.conversation_id,
    ) {
        Ok(id) => Json(ContactResponse { success: true, message_id: Some(id), error: None }),
        Err(_) => Json(ContactResponse {
            success: false,
            message_id: None,
            error: Some("failed to store message".into()),
        }),
    }
}
