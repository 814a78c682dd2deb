//! Tool registry and executor (§4.13). A small trait-object catalog, not
//! a hardcoded `if` on tool name, so prompt-assembly and dispatch are
//! both generated from the same source of truth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use chat_storage::ContactStorage;

use crate::types::{ToolCall, ToolResult};

const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ToolParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ToolParamSpec],
}

/// A callable, side-effectful capability the generator may invoke.
/// Implementations must sanitize their own inputs and must be safe to
/// call more than once with the same arguments (idempotent-safe, not
/// strictly idempotent — a duplicate call may re-save, and that's fine).
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, parameters: &serde_json::Value) -> ToolResult;
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Renders a prompt-facing catalog section listing every registered
    /// tool and its parameters, for the system prompt's tool-catalog
    /// augmentation.
    pub fn catalog(&self) -> String {
        if self.tools.is_empty() {
            return String::new();
        }
        let mut out = String::from("Available tools:\n");
        let mut names: Vec<&&'static str> = self.tools.keys().collect();
        names.sort();
        for name in names {
            let def = self.tools[name].definition();
            out.push_str(&format!("- {}: {}\n", def.name, def.description));
            for param in def.parameters {
                let req = if param.required { "required" } else { "optional" };
                out.push_str(&format!("    - {} ({}, {}): {}\n", param.name, param.kind, req, param.description));
            }
        }
        out
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches ` ```tool_call\n{...}\n``` ` blocks, tolerating surrounding
/// whitespace. One fixed pattern for the whole pipeline.
static TOOL_CALL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```tool_call\s*\n(?P<json>\{.*?\})\s*```").unwrap());

/// Parses every tool-call block out of `text`, skipping (and logging) any
/// block with invalid JSON or an unrecognized tool name rather than
/// failing the whole parse.
pub fn parse_tool_calls(text: &str, registry: &ToolRegistry) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    for capture in TOOL_CALL_BLOCK.captures_iter(text) {
        let raw_match = capture.get(0).unwrap().as_str().to_string();
        let json_text = &capture["json"];
        let value: serde_json::Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping tool_call block with invalid JSON");
                continue;
            }
        };
        let Some(tool_name) = value.get("tool").and_then(|t| t.as_str()) else {
            warn!("skipping tool_call block with no tool name");
            continue;
        };
        if !registry.is_known(tool_name) {
            warn!(tool = tool_name, "skipping tool_call block naming an unknown tool");
            continue;
        }
        let parameters = value.get("parameters").cloned().unwrap_or(serde_json::json!({}));
        calls.push(ToolCall {
            tool: tool_name.to_string(),
            parameters,
            raw_match,
        });
    }
    calls
}

/// Removes every parsed tool-call block from `text`, leaving the
/// user-visible portion of the generator's output.
pub fn strip_tool_call_blocks(text: &str, calls: &[ToolCall]) -> String {
    let mut stripped = text.to_string();
    for call in calls {
        stripped = stripped.replace(&call.raw_match, "");
    }
    let collapsed = stripped.trim();
    collapsed.to_string()
}

/// Executes every call serially (not in parallel), each bounded by
/// `TOOL_CALL_TIMEOUT`. A timeout or missing tool yields a failed
/// `ToolResult` rather than propagating an error into the generator loop.
pub async fn execute_all(registry: &ToolRegistry, calls: &[ToolCall]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        let result = match registry.get(&call.tool) {
            Some(tool) => match tokio::time::timeout(TOOL_CALL_TIMEOUT, tool.call(&call.parameters)).await {
                Ok(result) => result,
                Err(_) => ToolResult {
                    success: false,
                    tool: call.tool.clone(),
                    message: "tool call timed out".to_string(),
                    payload: None,
                },
            },
            None => ToolResult {
                success: false,
                tool: call.tool.clone(),
                message: "unknown tool".to_string(),
                payload: None,
            },
        };
        results.push(result);
    }
    results
}

/// The one tool registered today (§4.13): lets the generator save a
/// visitor's message for later follow-up instead of pretending it can
/// answer on the subject's behalf.
pub struct SaveVisitorMessageTool {
    storage: Arc<ContactStorage>,
    ip_hash: String,
    conversation_id: String,
}

impl SaveVisitorMessageTool {
    pub fn new(storage: Arc<ContactStorage>, ip_hash: String, conversation_id: String) -> Self {
        Self { storage, ip_hash, conversation_id }
    }
}

const SAVE_VISITOR_MESSAGE_PARAMS: &[ToolParamSpec] = &[
    ToolParamSpec {
        name: "message",
        kind: "string",
        required: true,
        description: "the visitor's message, verbatim",
    },
    ToolParamSpec {
        name: "sender_name",
        kind: "string",
        required: false,
        description: "the visitor's name, if given",
    },
    ToolParamSpec {
        name: "sender_email",
        kind: "string",
        required: false,
        description: "the visitor's email, if given",
    },
];

#[async_trait]
impl Tool for SaveVisitorMessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "save_message_for_kellogg",
            description: "Saves a message from the visitor for later follow-up. Use this when \
                the visitor wants to get in touch, leave feedback, or ask something only the \
                human behind this assistant can answer.",
            parameters: SAVE_VISITOR_MESSAGE_PARAMS,
        }
    }

    async fn call(&self, parameters: &serde_json::Value) -> ToolResult {
        let Some(message) = parameters.get("message").and_then(|v| v.as_str()).map(str::trim) else {
            return ToolResult {
                success: false,
                tool: "save_message_for_kellogg".into(),
                message: "missing required parameter: message".into(),
                payload: None,
            };
        };
        if message.is_empty() {
            return ToolResult {
                success: false,
                tool: "save_message_for_kellogg".into(),
                message: "message parameter was empty".into(),
                payload: None,
            };
        }

        let sender_name = parameters.get("sender_name").and_then(|v| v.as_str()).map(str::to_string);
        let sender_email = parameters.get("sender_email").and_then(|v| v.as_str()).map(str::to_string);

        match self.storage.store(
            message.to_string(),
            sender_name,
            sender_email,
            None,
            Some(self.ip_hash.clone()),
            Some(self.conversation_id.clone()),
        ) {
            Ok(id) => ToolResult {
                success: true,
                tool: "save_message_for_kellogg".into(),
                message: "message saved".into(),
                payload: Some(serde_json::json!({ "id": id })),
            },
            Err(e) => ToolResult {
                success: false,
                tool: "save_message_for_kellogg".into(),
                message: format!("failed to save message: {e}"),
                payload: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo",
                description: "echoes its input",
                parameters: &[ToolParamSpec {
                    name: "text",
                    kind: "string",
                    required: true,
                    description: "text to echo",
                }],
            }
        }

        async fn call(&self, parameters: &serde_json::Value) -> ToolResult {
            ToolResult {
                success: true,
                tool: "echo".into(),
                message: parameters.get("text").and_then(|t| t.as_str()).unwrap_or("").to_string(),
                payload: None,
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(EchoTool));
        r
    }

    #[test]
    fn parses_valid_tool_call_block() {
        let text = "Sure.\n```tool_call\n{\"tool\":\"echo\",\"parameters\":{\"text\":\"hi\"}}\n```\nDone.";
        let calls = parse_tool_calls(text, &registry());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "echo");
    }

    #[test]
    fn skips_unknown_tool_name() {
        let text = "```tool_call\n{\"tool\":\"delete_everything\",\"parameters\":{}}\n```";
        let calls = parse_tool_calls(text, &registry());
        assert!(calls.is_empty());
    }

    #[test]
    fn skips_invalid_json() {
        let text = "```tool_call\nnot json\n```";
        let calls = parse_tool_calls(text, &registry());
        assert!(calls.is_empty());
    }

    #[test]
    fn strips_tool_call_blocks_from_response() {
        let text = "Here you go.\n```tool_call\n{\"tool\":\"echo\",\"parameters\":{}}\n```";
        let calls = parse_tool_calls(text, &registry());
        let stripped = strip_tool_call_blocks(text, &calls);
        assert!(!stripped.contains("tool_call"));
        assert_eq!(stripped, "Here you go.");
    }

    #[tokio::test]
    async fn execute_all_runs_serially_and_succeeds() {
        let registry = registry();
        let calls = vec![ToolCall {
            tool: "echo".into(),
            parameters: serde_json::json!({"text": "hello"}),
            raw_match: String::new(),
        }];
        let results = execute_all(&registry, &calls).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].message, "hello");
    }

    #[tokio::test]
    async fn save_visitor_message_tool_persists_and_rejects_empty_message() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ContactStorage::new(dir.path()).unwrap());
        let tool = SaveVisitorMessageTool::new(storage.clone(), "iphash".into(), "conv-1".into());

        let ok = tool
            .call(&serde_json::json!({"message": "please reach out", "sender_email": "jane@example.com"}))
            .await;
        assert!(ok.success);
        assert_eq!(storage.count(), 1);

        let rejected = tool.call(&serde_json::json!({"message": "   "})).await;
        assert!(!rejected.success);
        assert_eq!(storage.count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_failed_result_not_panic() {
        let registry = registry();
        let calls = vec![ToolCall {
            tool: "does_not_exist".into(),
            parameters: serde_json::json!({}),
            raw_match: String::new(),
        }];
        let results = execute_all(&registry, &calls).await;
        assert!(!results[0].success);
    }
}
