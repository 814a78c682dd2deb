//! L5 — context retrieval, basic variant. Assembles a bounded, labeled
//! text blob of trusted context for a domain by reading registry-listed
//! files straight off disk; no model call. The semantic variant
//! (`l5_semantic`) layers embedding-based ranking on top and falls back
//! to this one whenever embedding is unavailable.

use once_cell::sync::Lazy;
use regex::RegexSet;
use std::path::Path;

use chat_core::types::Domain;

use crate::types::{sources_for, ContextResult, ContextStatus};

static PLACEHOLDER_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)placeholder",
        r"(?i)todo\s*:",
        r"(?i)coming soon",
        r"(?i)\[insert",
        r"(?i)lorem ipsum",
    ])
    .unwrap()
});

fn has_placeholder_content(blob: &str) -> bool {
    PLACEHOLDER_PATTERNS.is_match(blob)
}

/// Logarithmic length score that saturates near 10k characters, combined
/// with source completeness (loaded / (loaded + missing)).
pub(crate) fn quality_score(blob_len: usize, loaded: usize, missing: usize) -> f64 {
    if blob_len == 0 {
        return 0.0;
    }
    let length_score = ((blob_len as f64).ln() / (10_000_f64).ln()).clamp(0.0, 1.0);
    let total = loaded + missing;
    let completeness = if total == 0 { 0.0 } else { loaded as f64 / total as f64 };
    (0.6 * length_score + 0.4 * completeness).clamp(0.0, 1.0)
}

fn read_source(context_dir: &str, relative_path: &str) -> Option<String> {
    let path = Path::new(context_dir).join(relative_path);
    std::fs::read_to_string(&path).ok().map(|s| s.trim().to_string())
}

/// Reads every registry entry for `domain`, required-then-priority order,
/// stopping once the blob would exceed `max_blob_chars` (the offending
/// content is truncated with a marker rather than dropped wholesale).
pub fn retrieve_basic(domain: Domain, context_dir: &str, max_blob_chars: u64, min_useful_chars: u64) -> ContextResult {
    if domain == Domain::OutOfScope {
        return ContextResult::empty();
    }

    let entries = sources_for(domain);
    if entries.is_empty() {
        return ContextResult::empty();
    }

    let mut blob = String::new();
    let mut loaded = Vec::new();
    let mut missing = Vec::new();
    let ceiling = max_blob_chars as usize;

    for entry in &entries {
        let Some(content) = read_source(context_dir, entry.relative_path) else {
            missing.push(entry.name);
            continue;
        };
        if content.is_empty() {
            missing.push(entry.name);
            continue;
        }

        let section = format!("## {}\n\n{}\n\n", entry.display_label, content);
        if blob.chars().count() + section.chars().count() > ceiling {
            let remaining = ceiling.saturating_sub(blob.chars().count());
            if remaining > 0 {
                let truncated: String = section.chars().take(remaining).collect();
                blob.push_str(&truncated);
                blob.push_str("\n...[truncated]\n");
            }
            loaded.push(entry.name);
            break;
        }

        blob.push_str(&section);
        loaded.push(entry.name);
    }

    let mut quality = quality_score(blob.chars().count(), loaded.len(), missing.len());
    if has_placeholder_content(&blob) {
        quality = quality.min(0.2);
    }

    let status = if blob.chars().count() < min_useful_chars as usize || quality <= 0.2 {
        ContextStatus::Insufficient
    } else if !missing.is_empty() {
        ContextStatus::Partial
    } else {
        ContextStatus::Success
    };

    ContextResult {
        blob: blob.trim().to_string(),
        quality,
        status,
        loaded_sources: loaded,
        missing_sources: missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_context(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn out_of_scope_yields_empty_context_immediately() {
        let result = retrieve_basic(Domain::OutOfScope, "/nonexistent", 8000, 200);
        assert_eq!(result.status, ContextStatus::NoContext);
        assert!(result.blob.is_empty());
    }

    #[test]
    fn missing_required_source_is_tracked_and_marks_partial_or_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let result = retrieve_basic(Domain::Hobbies, dir.path().to_str().unwrap(), 8000, 200);
        assert!(!result.missing_sources.is_empty());
        assert_ne!(result.status, ContextStatus::Success);
    }

    #[test]
    fn placeholder_content_forces_low_quality() {
        let dir = tempfile::tempdir().unwrap();
        write_context(dir.path(), "philosophy/philosophy.md", "Lorem ipsum dolor sit amet, placeholder text here that is reasonably long to pass the length check on its own merits.");
        let result = retrieve_basic(Domain::Philosophy, dir.path().to_str().unwrap(), 8000, 10);
        assert!(result.quality <= 0.2);
    }

    #[test]
    fn real_content_loads_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let body = "a".repeat(500);
        write_context(dir.path(), "hobbies/hobbies.md", &body);
        let result = retrieve_basic(Domain::Hobbies, dir.path().to_str().unwrap(), 8000, 200);
        assert!(result.blob.contains("## Hobbies & Interests"));
        assert!(result.loaded_sources.contains(&"hobbies"));
    }

    #[test]
    fn oversized_content_is_truncated_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let body = "x".repeat(5000);
        write_context(dir.path(), "hobbies/hobbies.md", &body);
        let result = retrieve_basic(Domain::Hobbies, dir.path().to_str().unwrap(), 1000, 200);
        assert!(result.blob.contains("[truncated]"));
        assert!(result.blob.chars().count() <= 1100);
    }
}
