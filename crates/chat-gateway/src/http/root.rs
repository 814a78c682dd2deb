//! GET / — a tiny liveness banner. The real chat widget is an external
//! collaborator; this route only confirms the gateway itself answers.

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct RootResponse {
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        service: "chat-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}
