//! Pipeline-internal types not shared outside this crate: the context
//! source registry, retrieval results, generator/tool-call shapes.

use chat_core::types::Domain;

/// Compile-time registry entry. The registry is the sole authority for
/// what context exists; there is no dynamic discovery.
#[derive(Debug, Clone, Copy)]
pub struct ContextSourceEntry {
    pub name: &'static str,
    pub display_label: &'static str,
    pub relative_path: &'static str,
    pub domain: Domain,
    pub required: bool,
    pub priority: i32,
}

/// The static context-source table. A real deployment points
/// `relative_path` at files under the configured context directory;
/// entries here describe a plausible hand-curated personal-site corpus.
pub const CONTEXT_SOURCES: &[ContextSourceEntry] = &[
    ContextSourceEntry {
        name: "resume",
        display_label: "Work Experience",
        relative_path: "professional/resume.md",
        domain: Domain::Professional,
        required: true,
        priority: 100,
    },
    ContextSourceEntry {
        name: "skills",
        display_label: "Skills",
        relative_path: "professional/skills.md",
        domain: Domain::Professional,
        required: false,
        priority: 50,
    },
    ContextSourceEntry {
        name: "projects",
        display_label: "Projects",
        relative_path: "projects/projects.md",
        domain: Domain::Projects,
        required: true,
        priority: 100,
    },
    ContextSourceEntry {
        name: "hobbies",
        display_label: "Hobbies & Interests",
        relative_path: "hobbies/hobbies.md",
        domain: Domain::Hobbies,
        required: true,
        priority: 100,
    },
    ContextSourceEntry {
        name: "philosophy",
        display_label: "Philosophy & Values",
        relative_path: "philosophy/philosophy.md",
        domain: Domain::Philosophy,
        required: true,
        priority: 100,
    },
    ContextSourceEntry {
        name: "linkedin",
        display_label: "LinkedIn Profile",
        relative_path: "linkedin/linkedin.md",
        domain: Domain::Linkedin,
        required: true,
        priority: 100,
    },
    ContextSourceEntry {
        name: "about",
        display_label: "About This Assistant",
        relative_path: "meta/about.md",
        domain: Domain::Meta,
        required: true,
        priority: 100,
    },
];

pub fn sources_for(domain: Domain) -> Vec<&'static ContextSourceEntry> {
    let mut entries: Vec<&ContextSourceEntry> = CONTEXT_SOURCES.iter().filter(|e| e.domain == domain).collect();
    entries.sort_by(|a, b| b.required.cmp(&a.required).then(b.priority.cmp(&a.priority)));
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    Success,
    Partial,
    Insufficient,
    NoContext,
}

#[derive(Debug, Clone)]
pub struct ContextResult {
    pub blob: String,
    pub quality: f64,
    pub status: ContextStatus,
    pub loaded_sources: Vec<&'static str>,
    pub missing_sources: Vec<&'static str>,
}

impl ContextResult {
    pub fn empty() -> Self {
        Self {
            blob: String::new(),
            quality: 0.0,
            status: ContextStatus::NoContext,
            loaded_sources: Vec::new(),
            missing_sources: Vec::new(),
        }
    }
}

/// A tool-call request parsed out of generator text, with its raw match
/// retained so the executor can strip it from the user-visible response.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub parameters: serde_json::Value,
    pub raw_match: String,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub tool: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

/// Output of one L6 invocation: either finished text, or partial text
/// plus tool calls still to execute.
#[derive(Debug, Clone)]
pub struct GeneratorResult {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub degraded: bool,
}
