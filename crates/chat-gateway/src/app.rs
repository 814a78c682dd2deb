//! Shared application state and router assembly.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use chat_conversation::ConversationManager;
use chat_core::config::AppConfig;
use chat_core::ratelimit::RateLimiter;
use chat_llm::{LlmClient, OllamaClient};
use chat_pipeline::{FastPipelineOrchestrator, OrchestratorDeps, PipelineOrchestrator, SemanticRetriever};
use chat_storage::{ContactStorage, ConversationStorage};

/// One of the two orchestrator variants, chosen once at startup from
/// `pipeline.use_fast_safety_check` and shared behind an `Arc` for the
/// life of the process.
pub enum Orchestrator {
    Full(Arc<PipelineOrchestrator>),
    Fast(Arc<FastPipelineOrchestrator>),
}

/// Central shared state, passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Orchestrator,
    pub contact_storage: Arc<ContactStorage>,
    pub conversation_storage: Arc<ConversationStorage>,
    pub llm: Arc<dyn LlmClient>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(config: AppConfig, metrics_handle: PrometheusHandle) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(config.models.ollama_url.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let conversations =
            Arc::new(ConversationManager::new(config.conversation.max_turns, config.conversation.ttl_secs));
        let conversation_storage = Arc::new(ConversationStorage::new(
            format!("{}/conversations", config.paths.base_dir),
        )?);
        let contact_storage = Arc::new(ContactStorage::new(format!("{}/contact", config.paths.base_dir))?);
        let semantic = Arc::new(SemanticRetriever::new(format!("{}/semantic-cache", config.paths.base_dir)));

        let deps = Arc::new(OrchestratorDeps {
            config: config.clone(),
            rate_limiter,
            conversations,
            storage: conversation_storage.clone(),
            llm: llm.clone(),
            semantic,
            contact_storage: contact_storage.clone(),
        });

        let orchestrator = if config.pipeline.use_fast_safety_check {
            Orchestrator::Fast(Arc::new(FastPipelineOrchestrator::new(deps)))
        } else {
            Orchestrator::Full(Arc::new(PipelineOrchestrator::new(deps)))
        };

        Ok(Self {
            config,
            orchestrator,
            contact_storage,
            conversation_storage,
            llm,
            metrics_handle,
        })
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::HeaderName::from_static("x-request-id")])
        .allow_credentials(false)
}

/// Assembles the full Axum router. `/metrics` is only mounted when
/// `server.metrics_enabled` is set; the handler itself additionally
/// gates on the trusted-proxy/localhost allowlist per request.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(crate::http::root::root_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/contact", post(crate::http::contact::contact_handler));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(crate::http::metrics::metrics_handler));
    }

    router
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Installs the global Prometheus recorder and returns the handle used to
/// render exposition text at `/metrics`. Must run exactly once per process.
pub fn install_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}
