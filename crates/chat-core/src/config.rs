//! Layered configuration: a TOML file overlaid by a `CHAT_`-prefixed
//! environment, with hard floors that neither layer can undercut.
//!
//! Load order mirrors the rest of the ecosystem: explicit path argument,
//! then `CHAT_CONFIG` env var, then `~/.chat-pipeline/config.toml`, then
//! pure defaults if nothing exists on disk.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

fn clamp_min_u64(v: u64, floor: u64) -> u64 {
    v.max(floor)
}

fn clamp_min_f64(v: f64, floor: f64) -> f64 {
    if v < floor {
        floor
    } else {
        v
    }
}

/// L0/L1 size and shape limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityLimits {
    pub max_input_length: u64,
    pub max_request_bytes: u64,
    pub request_timeout_secs: u64,
    pub max_context_length: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_input_length: 2000,
            max_request_bytes: 8192,
            request_timeout_secs: 30,
            max_context_length: 32_000,
        }
    }
}

impl SecurityLimits {
    const MAX_INPUT_LENGTH_FLOOR: u64 = 100;
    const MAX_REQUEST_BYTES_FLOOR: u64 = 1024;
    const REQUEST_TIMEOUT_FLOOR: u64 = 5;
    const MAX_CONTEXT_LENGTH_FLOOR: u64 = 1000;

    fn clamp(mut self) -> Self {
        self.max_input_length = clamp_min_u64(self.max_input_length, Self::MAX_INPUT_LENGTH_FLOOR);
        self.max_request_bytes = clamp_min_u64(self.max_request_bytes, Self::MAX_REQUEST_BYTES_FLOOR);
        self.request_timeout_secs = clamp_min_u64(self.request_timeout_secs, Self::REQUEST_TIMEOUT_FLOOR);
        self.max_context_length = clamp_min_u64(self.max_context_length, Self::MAX_CONTEXT_LENGTH_FLOOR);
        self
    }
}

/// Sliding-window rate limiter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub per_ip_per_minute: u64,
    pub per_ip_per_hour: u64,
    pub global_per_minute: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_ip_per_minute: 10,
            per_ip_per_hour: 100,
            global_per_minute: 1000,
        }
    }
}

impl RateLimits {
    const PER_IP_PER_MINUTE_FLOOR: u64 = 1;
    const PER_IP_PER_HOUR_FLOOR: u64 = 10;
    const GLOBAL_PER_MINUTE_FLOOR: u64 = 100;

    fn clamp(mut self) -> Self {
        self.per_ip_per_minute = clamp_min_u64(self.per_ip_per_minute, Self::PER_IP_PER_MINUTE_FLOOR);
        self.per_ip_per_hour = clamp_min_u64(self.per_ip_per_hour, Self::PER_IP_PER_HOUR_FLOOR);
        self.global_per_minute = clamp_min_u64(self.global_per_minute, Self::GLOBAL_PER_MINUTE_FLOOR);
        self
    }
}

/// Model-tier selection and per-tier timeouts for the Ollama-compatible runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub classifier_model: String,
    pub router_model: String,
    pub generator_model: String,
    /// Defaults to the classifier model — deliberately a different model
    /// family from the generator to avoid self-reinforcing bias in L8.
    pub verifier_model: String,
    pub embedding_model: String,
    pub ollama_url: String,
    pub classifier_timeout_secs: f64,
    pub generator_timeout_secs: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_model: "qwen2.5:0.5b".into(),
            router_model: "llama3.2:1b".into(),
            generator_model: "mistral:7b".into(),
            verifier_model: "qwen2.5:0.5b".into(),
            embedding_model: "nomic-embed-text".into(),
            ollama_url: "http://localhost:11434".into(),
            classifier_timeout_secs: 10.0,
            generator_timeout_secs: 60.0,
        }
    }
}

impl ModelConfig {
    const CLASSIFIER_TIMEOUT_FLOOR: f64 = 5.0;
    const GENERATOR_TIMEOUT_FLOOR: f64 = 10.0;

    fn clamp(mut self) -> Self {
        self.classifier_timeout_secs =
            clamp_min_f64(self.classifier_timeout_secs, Self::CLASSIFIER_TIMEOUT_FLOOR);
        self.generator_timeout_secs =
            clamp_min_f64(self.generator_timeout_secs, Self::GENERATOR_TIMEOUT_FLOOR);
        self
    }
}

/// In-memory conversation turn/TTL limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationLimits {
    pub max_turns: u64,
    pub ttl_secs: u64,
    pub max_history_tokens: u64,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        Self {
            max_turns: 10,
            ttl_secs: 1800,
            max_history_tokens: 4000,
        }
    }
}

impl ConversationLimits {
    const MAX_TURNS_FLOOR: u64 = 2;
    const TTL_FLOOR: u64 = 60;
    const MAX_HISTORY_TOKENS_FLOOR: u64 = 500;

    fn clamp(mut self) -> Self {
        self.max_turns = clamp_min_u64(self.max_turns, Self::MAX_TURNS_FLOOR);
        self.ttl_secs = clamp_min_u64(self.ttl_secs, Self::TTL_FLOOR);
        self.max_history_tokens = clamp_min_u64(self.max_history_tokens, Self::MAX_HISTORY_TOKENS_FLOOR);
        self
    }
}

/// L5 context-retrieval tunables: basic-variant length ceiling and the
/// semantic variant's chunking/similarity parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_blob_chars: u64,
    pub min_useful_chars: u64,
    pub use_semantic: bool,
    pub chunk_target_chars: u64,
    pub chunk_overlap_ratio: f64,
    pub similarity_floor: f64,
    pub top_k: u64,
    pub overview_chunks_per_source: u64,
    pub cache_version: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_blob_chars: 8000,
            min_useful_chars: 200,
            use_semantic: false,
            chunk_target_chars: 500,
            chunk_overlap_ratio: 0.25,
            similarity_floor: 0.5,
            top_k: 5,
            overview_chunks_per_source: 2,
            cache_version: 1,
        }
    }
}

impl RetrievalConfig {
    const MAX_BLOB_CHARS_FLOOR: u64 = 500;
    const CHUNK_TARGET_CHARS_FLOOR: u64 = 100;

    fn clamp(mut self) -> Self {
        self.max_blob_chars = clamp_min_u64(self.max_blob_chars, Self::MAX_BLOB_CHARS_FLOOR);
        self.chunk_target_chars = clamp_min_u64(self.chunk_target_chars, Self::CHUNK_TARGET_CHARS_FLOOR);
        self.chunk_overlap_ratio = self.chunk_overlap_ratio.clamp(0.0, 0.9);
        self.similarity_floor = self.similarity_floor.clamp(0.0, 1.0);
        self
    }
}

/// Which orchestrator variant and which sub-behaviors it uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub use_combined_classifier: bool,
    pub skip_revision: bool,
    pub use_fast_safety_check: bool,
    pub enable_streaming: bool,
    pub max_tool_iterations: u64,
    pub min_context_quality: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_combined_classifier: true,
            skip_revision: true,
            use_fast_safety_check: true,
            enable_streaming: true,
            max_tool_iterations: 3,
            min_context_quality: 0.4,
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub debug: bool,
    pub cors_origins: Vec<String>,
    pub trusted_proxies: Vec<String>,
    pub metrics_enabled: bool,
    /// Known-public addresses L8's pattern-based check never flags, e.g.
    /// a published contact address that would otherwise look like a
    /// private-info leak.
    pub public_email_allow_list: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            debug: false,
            cors_origins: vec![
                "https://kellogg.example.com".into(),
                "https://www.kellogg.example.com".into(),
            ],
            public_email_allow_list: vec!["hello@kellogg.example.com".into()],
            // Empty by default: don't trust any proxy until configured.
            trusted_proxies: Vec::new(),
            metrics_enabled: false,
        }
    }
}

/// Filesystem locations for context sources, prompts, and data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub base_dir: String,
    pub context_dir: String,
    pub prompts_dir: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            base_dir: ".".into(),
            context_dir: "./context".into(),
            prompts_dir: "./prompts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub admin_enabled: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub security: SecurityLimits,
    pub rate_limits: RateLimits,
    pub models: ModelConfig,
    pub conversation: ConversationLimits,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub paths: PathConfig,
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Load from an explicit path, else `CHAT_CONFIG`, else `~/.chat-pipeline/config.toml`,
    /// overlaid by `CHAT_`-prefixed environment variables, then clamp every floor.
    pub fn load(explicit_path: Option<&str>) -> Result<Self> {
        let path = explicit_path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("CHAT_CONFIG").ok())
            .or_else(|| {
                dirs_home().map(|h| format!("{}/.chat-pipeline/config.toml", h))
            });

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(p) = &path {
            if std::path::Path::new(p).exists() {
                figment = figment.merge(Toml::file(p));
            }
        }
        figment = figment.merge(Env::prefixed("CHAT_").split("_"));

        let raw: AppConfig = figment
            .extract()
            .map_err(|e| ChatError::Config(e.to_string()))?;
        Ok(raw.clamp())
    }

    fn clamp(mut self) -> Self {
        self.security = self.security.clamp();
        self.rate_limits = self.rate_limits.clamp();
        self.models = self.models.clamp();
        self.conversation = self.conversation.clamp();
        self.retrieval = self.retrieval.clamp();
        self
    }
}

fn dirs_home() -> Option<String> {
    std::env::var("HOME").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_already_satisfy_floors() {
        let cfg = AppConfig::default().clamp();
        assert_eq!(cfg.security.max_input_length, 2000);
        assert_eq!(cfg.rate_limits.per_ip_per_minute, 10);
    }

    #[test]
    fn floors_cannot_be_undercut() {
        let mut cfg = AppConfig::default();
        cfg.security.max_input_length = 1;
        cfg.rate_limits.per_ip_per_minute = 0;
        cfg.models.classifier_timeout_secs = 0.1;
        let clamped = cfg.clamp();
        assert_eq!(clamped.security.max_input_length, SecurityLimits::MAX_INPUT_LENGTH_FLOOR);
        assert_eq!(clamped.rate_limits.per_ip_per_minute, RateLimits::PER_IP_PER_MINUTE_FLOOR);
        assert_eq!(clamped.models.classifier_timeout_secs, ModelConfig::CLASSIFIER_TIMEOUT_FLOOR);
    }
}
