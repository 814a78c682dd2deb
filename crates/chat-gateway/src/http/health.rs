//! GET /health — component status for uptime monitors. Never touches
//! the pipeline; only reports whether its dependencies are reachable.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app::AppState;

#[derive(Serialize)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub healthy: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: Vec<ComponentStatus>,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let llm_healthy = state.llm.health_check().await;
    let storage_healthy = std::path::Path::new(&state.config.paths.base_dir).exists();

    let components = vec![
        ComponentStatus { name: "llm_runtime", healthy: llm_healthy },
        ComponentStatus { name: "storage", healthy: storage_healthy },
    ];
    let all_healthy = components.iter().all(|c| c.healthy);

    Json(HealthResponse {
        status: if all_healthy { "ok" } else { "degraded" },
        components,
    })
}
