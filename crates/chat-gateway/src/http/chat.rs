//! POST /chat — the public entry point into the nine-stage pipeline.
//! Responds with a plain JSON `ChatResponse`, or with a server-sent-event
//! token stream when the caller asks for one and streaming is enabled
//! and the active orchestrator supports it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use chat_core::audit;
use chat_core::types::RequestEnvelope;
use chat_llm::StreamEvent;

use crate::app::{AppState, Orchestrator};
use crate::proxy::client_address;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

fn build_envelope(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    req: ChatRequest,
) -> RequestEnvelope {
    let address = client_address(peer, headers, &state.config.server.trusted_proxies);
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string);
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    RequestEnvelope {
        request_id: audit::generate_request_id(),
        conversation_id: req.conversation_id,
        peer_addr: address,
        content_type,
        content_length,
        raw_message: req.message,
    }
}

fn wants_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> axum::response::Response {
    let envelope = build_envelope(&state, peer, &headers, req);

    if state.config.pipeline.enable_streaming && wants_stream(&headers) {
        if let Orchestrator::Fast(orchestrator) = &state.orchestrator {
            return stream_response(orchestrator.clone(), envelope).into_response();
        }
    }

    let response = match &state.orchestrator {
        Orchestrator::Full(o) => o.handle(envelope).await,
        Orchestrator::Fast(o) => o.handle(envelope).await,
    };
    Json(response).into_response()
}

fn stream_response(
    orchestrator: Arc<chat_pipeline::FastPipelineOrchestrator>,
    envelope: RequestEnvelope,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<StreamEvent>(64);

    // Owns its own Arc, so the spawned task outlives this request handler
    // regardless of how long the caller takes to drain the SSE stream.
    tokio::spawn(async move {
        orchestrator.handle_stream(envelope, tx).await;
    });

    let events = ReceiverStream::new(rx).map(|event| {
        let payload = match event {
            StreamEvent::Token(token) => serde_json::json!({ "token": token }),
            StreamEvent::Done => serde_json::json!({ "done": true }),
        };
        Ok(Event::default().data(payload.to_string()))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
