//! Two concrete orchestrators over the same nine stages (§4.1). Both
//! share all setup through L5 via `OrchestratorDeps`; they diverge on
//! classifier strategy, whether L7 runs, which L8 variant screens the
//! draft, and (fast only) an early exit before L6 on low context quality.
//! Conversation state is only ever updated after a successful delivery —
//! blocked requests never reach `ConversationManager::add_exchange`.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chat_conversation::{Conversation, ConversationManager, Role};
use chat_core::audit;
use chat_core::config::AppConfig;
use chat_core::error::ChatError;
use chat_core::ratelimit::RateLimiter;
use chat_core::types::{ChatResponse, Domain, LayerTimingsMs, QuestionType, RequestEnvelope, Topic};
use chat_llm::{ChatMessage, LlmClient, StreamEvent};
use chat_storage::{ContactStorage, ConversationStorage};
use tokio::sync::mpsc;

use crate::l0_gateway::{self, GatewayReject};
use crate::l1_sanitize::{sanitize, SanitizeError};
use crate::l2_classifier;
use crate::l2l3_fused;
use crate::l3_intent;
use crate::l4_router;
use crate::l5_context;
use crate::l5_semantic::SemanticRetriever;
use crate::l6_generator::{self, HistoryTurn};
use crate::l7_revision;
use crate::l8_safety;
use crate::l9_response;
use crate::tools::{execute_all, SaveVisitorMessageTool, ToolRegistry};
use crate::types::{ContextResult, ToolResult};

const GENERATOR_HISTORY_TURNS: usize = 6;
const CLASSIFIER_HISTORY_TURNS: usize = 4;
const GENERATOR_HISTORY_CHAR_CEILING: usize = 800;
const GROUNDING_SIMILARITY_FLOOR: f64 = 0.5;
const GROUNDING_CHUNK_CHARS: usize = 500;
const REVISION_CONTEXT_TRUNCATE_CHARS: usize = 2000;

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

/// Times L9 assembly itself and records it under `"L9"` in the metadata
/// the caller already embedded `timings` into, so every stage the
/// pipeline actually runs gets a layer-timings key (§6).
fn finish_success(
    request_id: String,
    conversation_id: String,
    content: String,
    domain: &str,
    response_time_ms: f64,
    timings: LayerTimingsMs,
) -> ChatResponse {
    let l9_start = Instant::now();
    let mut response = l9_response::success(request_id, conversation_id, content, domain, response_time_ms, timings);
    response.metadata.layer_timings_ms.insert("L9".to_string(), elapsed_ms(l9_start));
    response
}

fn finish_failure(
    request_id: String,
    conversation_id: String,
    error: &ChatError,
    blocked_at_layer: Option<&str>,
    response_time_ms: f64,
    timings: LayerTimingsMs,
) -> ChatResponse {
    let l9_start = Instant::now();
    let mut response =
        l9_response::failure(request_id, conversation_id, error, blocked_at_layer, response_time_ms, timings);
    response.metadata.layer_timings_ms.insert("L9".to_string(), elapsed_ms(l9_start));
    response
}

fn timeout_secs(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.1))
}

fn topic_label(topic: Topic) -> &'static str {
    match topic {
        Topic::WorkExperience => "work_experience",
        Topic::Skills => "skills",
        Topic::Projects => "projects",
        Topic::Hobbies => "hobbies",
        Topic::Philosophy => "philosophy",
        Topic::Contact => "contact",
        Topic::Message => "message",
        Topic::ChatSystem => "chat_system",
        Topic::General => "general",
        Topic::Greeting => "greeting",
    }
}

fn question_type_label(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::Factual => "factual",
        QuestionType::Experience => "experience",
        QuestionType::Opinion => "opinion",
        QuestionType::Comparison => "comparison",
        QuestionType::Procedural => "procedural",
        QuestionType::Clarification => "clarification",
        QuestionType::Greeting => "greeting",
        QuestionType::Ambiguous => "ambiguous",
        QuestionType::Action => "action",
    }
}

fn classifier_history(conv: &Conversation) -> Vec<ChatMessage> {
    conv.history()
        .iter()
        .rev()
        .take(CLASSIFIER_HISTORY_TURNS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| match m.role {
            Role::User => ChatMessage::user(m.content.clone()),
            Role::Assistant => ChatMessage::assistant(m.content.clone()),
        })
        .collect()
}

fn generator_history(conv: &Conversation) -> Vec<HistoryTurn> {
    conv.history()
        .iter()
        .rev()
        .take(GENERATOR_HISTORY_TURNS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|m| {
            let truncated: String = m.content.chars().take(GENERATOR_HISTORY_CHAR_CEILING).collect();
            HistoryTurn { role: if m.role == Role::User { "user" } else { "assistant" }, content: truncated }
        })
        .collect()
}

/// Outcome of the shared L0..L5 prefix: either a state ready to continue
/// into L6, or a fully-assembled error response (the prefix already
/// handled audit logging and blocked-conversation bookkeeping).
enum PrefixOutcome {
    Proceed(PrefixState),
    Blocked(ChatResponse),
}

struct PrefixState {
    request_id: String,
    conversation_id: String,
    ip_hash: String,
    conversation: Conversation,
    sanitized_message: String,
    domain: Domain,
    context: ContextResult,
    timings: LayerTimingsMs,
    start: Instant,
}

/// Shared collaborators both orchestrator variants are built from.
pub struct OrchestratorDeps {
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<RateLimiter>,
    pub conversations: Arc<ConversationManager>,
    pub storage: Arc<ConversationStorage>,
    pub llm: Arc<dyn LlmClient>,
    pub semantic: Arc<SemanticRetriever>,
    pub contact_storage: Arc<ContactStorage>,
}

impl OrchestratorDeps {
    fn record(&self, timings: &mut LayerTimingsMs, request_id: &str, layer: &str, start: Instant) {
        let ms = elapsed_ms(start);
        timings.insert(layer.to_string(), ms);
        audit::log_layer_timing(request_id, layer, ms / 1000.0);
    }

    /// Runs L0 through L5. `use_fused_classifier` selects the combined
    /// L2+L3 call versus two separate ones.
    async fn run_prefix(&self, envelope: &RequestEnvelope, use_fused_classifier: bool) -> PrefixOutcome {
        let start = Instant::now();
        let mut timings: LayerTimingsMs = LayerTimingsMs::new();
        let request_id = envelope.request_id.clone();
        let ip_hash = audit::hash_ip(&envelope.peer_addr);

        // L0
        let l0_start = Instant::now();
        let gateway_result =
            l0_gateway::check(envelope, self.config.security.max_request_bytes, &self.rate_limiter, &ip_hash);
        self.record(&mut timings, &request_id, "L0", l0_start);
        if let Some(reject) = gateway_result.reject {
            let error = match reject {
                GatewayReject::RateLimited { retry_after_secs } => {
                    audit::log_rate_limit(&request_id, &ip_hash, retry_after_secs);
                    ChatError::RateLimited { retry_after_secs }
                }
                GatewayReject::RequestTooLarge => ChatError::InputTooLong,
                GatewayReject::InvalidContentType | GatewayReject::MissingMessage => {
                    ChatError::BlockedInput { reason: "malformed request".into() }
                }
            };
            let conversation_id = envelope.conversation_id.clone().unwrap_or_default();
            return PrefixOutcome::Blocked(finish_failure(
                request_id,
                conversation_id,
                &error,
                Some("L0"),
                elapsed_ms(start),
                timings,
            ));
        }

        let conversation = self.conversations.get_or_create(envelope.conversation_id.as_deref());
        let conversation_id = conversation.id.clone();

        if !self.conversations.check_turn_limit(&conversation_id) {
            let _ = self.storage.mark_blocked(&conversation_id, &ip_hash, "L0", now_secs());
            return PrefixOutcome::Blocked(finish_failure(
                request_id,
                conversation_id,
                &ChatError::RateLimited { retry_after_secs: self.config.conversation.ttl_secs },
                Some("L0"),
                elapsed_ms(start),
                timings,
            ));
        }

        // L1
        let l1_start = Instant::now();
        let sanitized = sanitize(&envelope.raw_message, &self.config.security);
        self.record(&mut timings, &request_id, "L1", l1_start);
        let sanitized_message = match sanitized {
            Ok(s) => s,
            Err(e) => {
                let error = match e {
                    SanitizeError::EmptyInput | SanitizeError::TooLong => ChatError::InputTooLong,
                    SanitizeError::BlockedPattern(reason) => {
                        audit::log_injection_attempt(&request_id, &ip_hash, reason.as_str(), "L1");
                        ChatError::BlockedInput { reason: reason.as_str().to_string() }
                    }
                };
                let _ = self.storage.mark_blocked(&conversation_id, &ip_hash, "L1", now_secs());
                return PrefixOutcome::Blocked(finish_failure(
                    request_id,
                    conversation_id,
                    &error,
                    Some("L1"),
                    elapsed_ms(start),
                    timings,
                ));
            }
        };
        audit::log_user_message(&request_id, &conversation_id, &envelope.raw_message, &sanitized_message);

        // L2 (+ L3, fused or separate). Any classifier failure, or an
        // explicit unsafe verdict, blocks the request unconditionally —
        // this is the one stage that overrides the generic recoverable-
        // error convention.
        let history = classifier_history(&conversation);
        // Fused call covers both L2 and L3 in one round trip, so it is
        // timed once under "L2". The separated path makes a genuinely
        // distinct L3 call and times it under its own key.
        let parsed = if use_fused_classifier {
            let l2_start = Instant::now();
            let result = l2l3_fused::classify_and_parse(
                self.llm.as_ref(),
                &self.config.models.classifier_model,
                &sanitized_message,
                &history,
                timeout_secs(self.config.models.classifier_timeout_secs),
            )
            .await
            .map(|(verdict, intent)| (verdict, Some(intent)));
            self.record(&mut timings, &request_id, "L2", l2_start);
            result
        } else {
            let l2_start = Instant::now();
            let classify_result = l2_classifier::classify(
                self.llm.as_ref(),
                &self.config.models.classifier_model,
                &sanitized_message,
                &history,
                timeout_secs(self.config.models.classifier_timeout_secs),
            )
            .await;
            self.record(&mut timings, &request_id, "L2", l2_start);

            match classify_result {
                Ok(verdict) if !verdict.safe => Ok((verdict, None)),
                Ok(verdict) => {
                    let l3_start = Instant::now();
                    let intent_result = l3_intent::parse_intent(
                        self.llm.as_ref(),
                        &self.config.models.router_model,
                        &sanitized_message,
                        timeout_secs(self.config.models.classifier_timeout_secs),
                    )
                    .await;
                    self.record(&mut timings, &request_id, "L3", l3_start);
                    intent_result.map(|intent| (verdict, Some(intent)))
                }
                Err(e) => Err(e),
            }
        };

        let (verdict, intent) = match parsed {
            Ok((verdict, Some(intent))) if verdict.safe => (verdict, intent),
            Ok((verdict, _)) => {
                let reason = verdict.reason.map(|r| format!("{r:?}")).unwrap_or_default();
                audit::log_injection_attempt(&request_id, &ip_hash, &reason, "L2");
                let _ = self.storage.mark_blocked(&conversation_id, &ip_hash, "L2", now_secs());
                return PrefixOutcome::Blocked(finish_failure(
                    request_id,
                    conversation_id,
                    &ChatError::BlockedInput { reason: "safety classifier rejected message".into() },
                    Some("L2"),
                    elapsed_ms(start),
                    timings,
                ));
            }
            Err(_) => {
                audit::log_injection_attempt(&request_id, &ip_hash, "classifier_error", "L2");
                let _ = self.storage.mark_blocked(&conversation_id, &ip_hash, "L2", now_secs());
                return PrefixOutcome::Blocked(finish_failure(
                    request_id,
                    conversation_id,
                    &ChatError::BlockedInput { reason: "safety classifier unavailable".into() },
                    Some("L2"),
                    elapsed_ms(start),
                    timings,
                ));
            }
        };
        audit::log_intent_parsed(
            &request_id,
            topic_label(intent.topic),
            question_type_label(intent.question_type),
            intent.confidence,
        );
        let _ = verdict;

        // L4
        let l4_start = Instant::now();
        let routing = l4_router::route(&intent, &sanitized_message);
        self.record(&mut timings, &request_id, "L4", l4_start);
        audit::log_domain_routed(&request_id, routing.domain.as_str(), routing.confidence);

        // L5
        let l5_start = Instant::now();
        let context = self
            .retrieve_context(routing.domain, &sanitized_message)
            .await;
        self.record(&mut timings, &request_id, "L5", l5_start);
        audit::log_context_retrieved(
            &request_id,
            routing.domain.as_str(),
            format!("{:?}", context.status).to_lowercase().as_str(),
            context.quality,
        );

        PrefixOutcome::Proceed(PrefixState {
            request_id,
            conversation_id,
            ip_hash,
            conversation,
            sanitized_message,
            domain: routing.domain,
            context,
            timings,
            start,
        })
    }

    async fn retrieve_context(&self, domain: Domain, query: &str) -> ContextResult {
        if domain == Domain::OutOfScope {
            return ContextResult::empty();
        }
        if self.config.retrieval.use_semantic {
            match self
                .semantic
                .retrieve(
                    domain,
                    query,
                    &self.config.paths.context_dir,
                    &self.config.retrieval,
                    self.llm.as_ref(),
                    &self.config.models.embedding_model,
                )
                .await
            {
                Ok(result) => return result,
                Err(_) => {
                    // Embedding unavailable: fall back to the basic variant.
                }
            }
        }
        l5_context::retrieve_basic(
            domain,
            &self.config.paths.context_dir,
            self.config.retrieval.max_blob_chars,
            self.config.retrieval.min_useful_chars,
        )
    }

    /// Builds the per-request tool catalog. The one tool registered today
    /// closes over this request's conversation id and hashed address, so
    /// the registry can't be built once at startup and shared.
    fn build_tool_registry(&self, state: &PrefixState) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SaveVisitorMessageTool::new(
            self.contact_storage.clone(),
            state.ip_hash.clone(),
            state.conversation_id.clone(),
        )));
        registry
    }

    /// Runs the L6 tool loop to completion: repeatedly invokes the
    /// generator, executing any parsed tool calls and feeding their
    /// results back in, until the generator stops asking for tools or
    /// the iteration cap is hit.
    async fn run_generator_loop(&self, state: &PrefixState) -> String {
        let registry = self.build_tool_registry(state);
        let history = generator_history(&state.conversation);
        let mut tool_results: Vec<ToolResult> = Vec::new();
        let mut result = l6_generator::generate_step(
            self.llm.as_ref(),
            &registry,
            &self.config.models.generator_model,
            state.domain,
            &state.context.blob,
            &history,
            &tool_results,
            &state.sanitized_message,
            timeout_secs(self.config.models.generator_timeout_secs),
        )
        .await;

        let mut iterations = 0u64;
        while !result.tool_calls.is_empty() && iterations < self.config.pipeline.max_tool_iterations {
            for call in &result.tool_calls {
                audit::log_tool_execution(&state.request_id, &call.tool, true);
            }
            let executed = execute_all(&registry, &result.tool_calls).await;
            for r in &executed {
                audit::log_tool_execution(&state.request_id, &r.tool, r.success);
            }
            tool_results.extend(executed);
            iterations += 1;

            result = l6_generator::generate_step(
                self.llm.as_ref(),
                &registry,
                &self.config.models.generator_model,
                state.domain,
                &state.context.blob,
                &history,
                &tool_results,
                &state.sanitized_message,
                timeout_secs(self.config.models.generator_timeout_secs),
            )
            .await;
        }

        result.text
    }

    /// Persists the exchange and updates in-memory conversation state.
    /// Only ever called after a response has cleared every stage — a
    /// blocked request never reaches here. Both messages are appended
    /// under a single `ConversationManager` lock acquisition (§5): two
    /// concurrent requests on the same conversation id can't interleave
    /// their pairs, and a turn-limit race can't strand an assistant
    /// message without its paired user message.
    fn commit_success(&self, state: &PrefixState, response_text: &str, response_time_ms: f64) {
        self.conversations.add_exchange(
            &state.conversation_id,
            state.sanitized_message.clone(),
            response_text.to_string(),
        );

        if self.config.analytics.enabled {
            let now = now_secs();
            let _ = self.storage.log_message(
                &state.conversation_id,
                &state.ip_hash,
                "user",
                &state.sanitized_message,
                None,
                None,
                now,
            );
            let _ = self.storage.log_message(
                &state.conversation_id,
                &state.ip_hash,
                "assistant",
                response_text,
                Some(state.domain.as_str()),
                Some(response_time_ms),
                now,
            );
        }
    }
}

/// Runs all nine stages with separate L2/L3 calls, the LLM-judged L8
/// variant (with an optional semantic grounding pass), and always
/// attempts L7 unless explicitly configured to skip it.
pub struct PipelineOrchestrator {
    deps: Arc<OrchestratorDeps>,
}

impl PipelineOrchestrator {
    pub fn new(deps: Arc<OrchestratorDeps>) -> Self {
        Self { deps }
    }

    pub async fn handle(&self, envelope: RequestEnvelope) -> ChatResponse {
        let mut state = match self.deps.run_prefix(&envelope, false).await {
            PrefixOutcome::Blocked(response) => return response,
            PrefixOutcome::Proceed(state) => state,
        };

        let l6_start = Instant::now();
        let draft = self.deps.run_generator_loop(&state).await;
        self.deps.record(&mut state.timings, &state.request_id, "L6", l6_start);

        let l7_start = Instant::now();
        let revised = if self.deps.config.pipeline.skip_revision {
            draft.clone()
        } else {
            l7_revision::revise(
                self.deps.llm.as_ref(),
                &self.deps.config.models.generator_model,
                &draft,
                &state.context.blob,
                &state.sanitized_message,
                REVISION_CONTEXT_TRUNCATE_CHARS,
                timeout_secs(self.deps.config.models.generator_timeout_secs),
            )
            .await
        };
        self.deps.record(&mut state.timings, &state.request_id, "L7", l7_start);

        let l8_start = Instant::now();
        let safety = l8_safety::check_llm(
            self.deps.llm.as_ref(),
            &self.deps.config.models.verifier_model,
            &revised,
            &state.context.blob,
            timeout_secs(self.deps.config.models.classifier_timeout_secs),
        )
        .await;
        let safety = if safety.safe && self.deps.config.retrieval.use_semantic {
            l8_safety::check_grounding(
                self.deps.llm.as_ref(),
                &self.deps.config.models.embedding_model,
                &revised,
                &state.context.blob,
                GROUNDING_SIMILARITY_FLOOR,
                GROUNDING_CHUNK_CHARS,
            )
            .await
        } else {
            safety
        };
        self.deps.record(&mut state.timings, &state.request_id, "L8", l8_start);
        audit::log_safety_check(&state.request_id, safety.safe, &[]);

        if !safety.safe {
            let _ = self.deps.storage.mark_blocked(&state.conversation_id, &state.ip_hash, "L8", now_secs());
            return finish_failure(
                state.request_id,
                state.conversation_id,
                &ChatError::SafetyFailed,
                Some("L8"),
                elapsed_ms(state.start),
                state.timings,
            );
        }

        let response_time_ms = elapsed_ms(state.start);
        self.deps.commit_success(&state, &revised, response_time_ms);
        finish_success(
            state.request_id,
            state.conversation_id,
            revised,
            state.domain.as_str(),
            response_time_ms,
            state.timings,
        )
    }
}

/// Runs the fused L2+L3 classifier, unconditionally skips L7 (recording
/// its timing as zero), uses the pattern-based L8, and short-circuits
/// before L6 entirely when L5's context quality falls below the
/// configured floor.
pub struct FastPipelineOrchestrator {
    deps: Arc<OrchestratorDeps>,
}

impl FastPipelineOrchestrator {
    pub fn new(deps: Arc<OrchestratorDeps>) -> Self {
        Self { deps }
    }

    pub async fn handle(&self, envelope: RequestEnvelope) -> ChatResponse {
        let mut state = match self.deps.run_prefix(&envelope, true).await {
            PrefixOutcome::Blocked(response) => return response,
            PrefixOutcome::Proceed(state) => state,
        };

        if state.domain != Domain::OutOfScope && state.context.quality < self.deps.config.pipeline.min_context_quality
        {
            state.timings.insert("L6".to_string(), 0.0);
            state.timings.insert("L7".to_string(), 0.0);
            state.timings.insert("L8".to_string(), 0.0);
            let response_text = l6_generator::canned_fallback(state.domain);
            let response_time_ms = elapsed_ms(state.start);
            self.deps.commit_success(&state, &response_text, response_time_ms);
            return finish_success(
                state.request_id,
                state.conversation_id,
                response_text,
                state.domain.as_str(),
                response_time_ms,
                state.timings,
            );
        }

        let l6_start = Instant::now();
        let draft = self.deps.run_generator_loop(&state).await;
        self.deps.record(&mut state.timings, &state.request_id, "L6", l6_start);

        state.timings.insert("L7".to_string(), 0.0);
        audit::log_layer_timing(&state.request_id, "L7", 0.0);

        let l8_start = Instant::now();
        let safety = l8_safety::check_fast(&draft, &self.deps.config.server.public_email_allow_list);
        self.deps.record(&mut state.timings, &state.request_id, "L8", l8_start);
        audit::log_safety_check(&state.request_id, safety.safe, &[]);

        if !safety.safe {
            let _ = self.deps.storage.mark_blocked(&state.conversation_id, &state.ip_hash, "L8", now_secs());
            return finish_failure(
                state.request_id,
                state.conversation_id,
                &ChatError::SafetyFailed,
                Some("L8"),
                elapsed_ms(state.start),
                state.timings,
            );
        }

        let response_time_ms = elapsed_ms(state.start);
        self.deps.commit_success(&state, &draft, response_time_ms);
        finish_success(
            state.request_id,
            state.conversation_id,
            draft,
            state.domain.as_str(),
            response_time_ms,
            state.timings,
        )
    }

    /// Streams L6 output token-by-token after running L0..L5 normally,
    /// then screens the complete draft with the fast safety check before
    /// conversation state is updated. Conversation history is only
    /// touched once the stream has closed cleanly; a mid-stream error
    /// leaves it untouched, matching the non-streaming delivery contract.
    pub async fn handle_stream(&self, envelope: RequestEnvelope, tx: mpsc::Sender<StreamEvent>) {
        let state = match self.deps.run_prefix(&envelope, true).await {
            PrefixOutcome::Blocked(_) => return,
            PrefixOutcome::Proceed(state) => state,
        };

        let history = generator_history(&state.conversation);
        let system_prompt_messages = vec![
            ChatMessage::system(format!(
                "Streaming response for domain {}. Use only the supplied context.",
                state.domain.as_str()
            )),
            ChatMessage::user(format!(
                "{}\n\n{}",
                state.context.blob, state.sanitized_message
            )),
        ];
        let _ = history;

        let (collector_tx, mut collector_rx) = mpsc::channel::<StreamEvent>(64);
        let stream_result = self
            .deps
            .llm
            .chat_stream(
                &self.deps.config.models.generator_model,
                &system_prompt_messages,
                0.7,
                timeout_secs(self.deps.config.models.generator_timeout_secs),
                collector_tx,
            )
            .await;

        if stream_result.is_err() {
            return;
        }

        let mut full_text = String::new();
        while let Some(event) = collector_rx.recv().await {
            if let StreamEvent::Token(token) = &event {
                full_text.push_str(token);
            }
            if tx.send(event).await.is_err() {
                return;
            }
        }

        let safety = l8_safety::check_fast(&full_text, &self.deps.config.server.public_email_allow_list);
        if !safety.safe {
            let _ = self.deps.storage.mark_blocked(&state.conversation_id, &state.ip_hash, "L8", now_secs());
            return;
        }

        let response_time_ms = elapsed_ms(state.start);
        self.deps.commit_success(&state, &full_text, response_time_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_core::config::RetrievalConfig;
    use std::time::Duration;

    struct StubClient;

    #[async_trait]
    impl LlmClient for StubClient {
        async fn chat_text(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f64,
            _timeout: Duration,
        ) -> chat_llm::error::Result<String> {
            Ok("Kellogg enjoys climbing and woodworking.".into())
        }

        async fn chat_json(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _timeout: Duration,
        ) -> chat_llm::error::Result<serde_json::Value> {
            Ok(serde_json::json!({
                "verdict": "SAFE",
                "reason": null,
                "safety_confidence": 0.9,
                "topic": "hobbies",
                "question_type": "factual",
                "entities": [],
                "emotional_tone": "curious",
                "confidence": 0.8
            }))
        }

        async fn chat_with_history(
            &self,
            _model: &str,
            _history: &[ChatMessage],
            _latest: ChatMessage,
            _temperature: f64,
            _timeout: Duration,
        ) -> chat_llm::error::Result<String> {
            Ok(String::new())
        }

        async fn chat_stream(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f64,
            _timeout: Duration,
            tx: mpsc::Sender<StreamEvent>,
        ) -> chat_llm::error::Result<()> {
            let _ = tx.send(StreamEvent::Token("hi".into())).await;
            let _ = tx.send(StreamEvent::Done).await;
            Ok(())
        }

        async fn embed(&self, _model: &str, _text: &str) -> chat_llm::error::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn list_models(&self) -> chat_llm::error::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn test_deps(context_dir: &std::path::Path) -> Arc<OrchestratorDeps> {
        let mut config = AppConfig::default();
        config.paths.context_dir = context_dir.to_str().unwrap().to_string();
        config.retrieval = RetrievalConfig::default();
        config.pipeline.min_context_quality = 0.0;
        config.analytics.enabled = false;

        let storage_dir = tempfile::tempdir().unwrap();
        Arc::new(OrchestratorDeps {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limits.clone())),
            conversations: Arc::new(ConversationManager::new(config.conversation.max_turns, config.conversation.ttl_secs)),
            storage: Arc::new(ConversationStorage::new(storage_dir.path().join("conversations")).unwrap()),
            llm: Arc::new(StubClient),
            semantic: Arc::new(SemanticRetriever::new(storage_dir.path().join("cache"))),
            contact_storage: Arc::new(ContactStorage::new(storage_dir.path().join("contact")).unwrap()),
            config: Arc::new(config),
        })
    }

    fn envelope(message: &str) -> RequestEnvelope {
        RequestEnvelope {
            request_id: "req-1".into(),
            conversation_id: None,
            peer_addr: "127.0.0.1".into(),
            content_type: Some("application/json".into()),
            content_length: Some(message.len() as u64),
            raw_message: message.into(),
        }
    }

    #[tokio::test]
    async fn fast_orchestrator_completes_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hobbies")).unwrap();
        std::fs::write(dir.path().join("hobbies/hobbies.md"), "a".repeat(300)).unwrap();
        let deps = test_deps(dir.path());
        let orchestrator = FastPipelineOrchestrator::new(deps);
        let response = orchestrator.handle(envelope("what do you do for fun")).await;
        assert!(response.success);
        // Fused L2+L3 call is timed once under "L2"; no standalone "L3" key.
        assert!(response.metadata.layer_timings_ms.contains_key("L2"));
        assert!(!response.metadata.layer_timings_ms.contains_key("L3"));
        assert!(response.metadata.layer_timings_ms.contains_key("L9"));
    }

    #[tokio::test]
    async fn full_orchestrator_completes_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hobbies")).unwrap();
        std::fs::write(dir.path().join("hobbies/hobbies.md"), "a".repeat(300)).unwrap();
        let deps = test_deps(dir.path());
        let orchestrator = PipelineOrchestrator::new(deps);
        let response = orchestrator.handle(envelope("what do you do for fun")).await;
        assert!(response.success);
        // Separated classifier path makes a genuinely distinct L3 call.
        assert!(response.metadata.layer_timings_ms.contains_key("L2"));
        assert!(response.metadata.layer_timings_ms.contains_key("L3"));
        assert!(response.metadata.layer_timings_ms.contains_key("L9"));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_at_l0() {
        let dir = tempfile::tempdir().unwrap();
        let deps = test_deps(dir.path());
        let orchestrator = FastPipelineOrchestrator::new(deps);
        let response = orchestrator.handle(envelope("   ")).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "blocked_input");
    }
}
