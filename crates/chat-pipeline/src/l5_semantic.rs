//! L5 — context retrieval, semantic variant. Splits each registry source
//! into overlapping word-window chunks, embeds them via the LLM runtime,
//! and persists the result to a per-domain disk cache keyed by a digest
//! of the sources' path/size/mtime plus a baked-in cache version. Falls
//! back to the basic variant (caller's responsibility) whenever any
//! embedding call fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chat_core::config::RetrievalConfig;
use chat_core::hashing::sha256_hex;
use chat_core::types::Domain;
use chat_llm::{LlmClient, ProviderError};
use serde::{Deserialize, Serialize};

use crate::l5_context::quality_score;
use crate::types::{sources_for, ContextResult, ContextStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedChunk {
    text: String,
    source_name: String,
    source_display_name: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    sources_hash: String,
    chunk_size: u64,
    chunk_overlap: f64,
    chunks: Vec<CachedChunk>,
}

#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    source_name: &'static str,
    source_display_name: &'static str,
    required_source: bool,
    embedding: Vec<f32>,
}

/// Cosine similarity. A zero-norm vector or a dimension mismatch yields
/// 0.0 rather than erroring, matching the fusion/ranking convention used
/// elsewhere in this ecosystem's retrieval code.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).take(len).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Overlapping word-window chunking: accumulate words until the window
/// reaches `target_chars`, emit a chunk, then seed the next window with
/// the trailing `overlap_ratio` fraction of the words just emitted.
fn chunk_words(text: &str, target_chars: usize, overlap_ratio: f64) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in words {
        current.push(word);
        current_len += word.len() + 1;
        if current_len >= target_chars {
            chunks.push(current.join(" "));
            let keep = ((current.len() as f64) * overlap_ratio).round() as usize;
            let keep = keep.min(current.len());
            let tail: Vec<&str> = current[current.len() - keep..].to_vec();
            current_len = tail.iter().map(|w| w.len() + 1).sum();
            current = tail;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

fn digest_sources(context_dir: &str, domain: Domain) -> String {
    let mut parts = Vec::new();
    for entry in sources_for(domain) {
        let path = Path::new(context_dir).join(entry.relative_path);
        let meta = std::fs::metadata(&path).ok();
        let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
        let mtime = meta
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        parts.push(format!("{}:{}:{}", entry.relative_path, size, mtime));
    }
    sha256_hex(&parts.join("|"))
}

pub struct SemanticRetriever {
    cache_dir: PathBuf,
    loaded: Mutex<HashMap<Domain, Vec<Chunk>>>,
}

impl SemanticRetriever {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn cache_path(&self, domain: Domain, cfg: &RetrievalConfig) -> PathBuf {
        self.cache_dir
            .join(format!("embeddings_{}_{}.json", domain.as_str(), cfg.cache_version))
    }

    fn read_from_disk(&self, domain: Domain, cfg: &RetrievalConfig, sources_hash: &str) -> Option<Vec<Chunk>> {
        let path = self.cache_path(domain, cfg);
        let contents = std::fs::read_to_string(path).ok()?;
        let file: CacheFile = serde_json::from_str(&contents).ok()?;
        if file.sources_hash != sources_hash
            || file.chunk_size != cfg.chunk_target_chars
            || (file.chunk_overlap - cfg.chunk_overlap_ratio).abs() > f64::EPSILON
        {
            return None;
        }
        let entries = sources_for(domain);
        let mut chunks = Vec::with_capacity(file.chunks.len());
        for c in file.chunks {
            let entry = entries.iter().find(|e| e.name == c.source_name)?;
            chunks.push(Chunk {
                text: c.text,
                source_name: entry.name,
                source_display_name: entry.display_label,
                required_source: entry.required,
                embedding: c.embedding,
            });
        }
        Some(chunks)
    }

    /// Write via a fresh temp file then rename, so a reader never observes
    /// a torn/partial cache file.
    fn write_to_disk(&self, domain: Domain, cfg: &RetrievalConfig, sources_hash: &str, chunks: &[Chunk]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let file = CacheFile {
            sources_hash: sources_hash.to_string(),
            chunk_size: cfg.chunk_target_chars,
            chunk_overlap: cfg.chunk_overlap_ratio,
            chunks: chunks
                .iter()
                .map(|c| CachedChunk {
                    text: c.text.clone(),
                    source_name: c.source_name.to_string(),
                    source_display_name: c.source_display_name.to_string(),
                    embedding: c.embedding.clone(),
                })
                .collect(),
        };
        let path = self.cache_path(domain, cfg);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(&file)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    async fn build_chunks(
        &self,
        domain: Domain,
        context_dir: &str,
        cfg: &RetrievalConfig,
        llm: &dyn LlmClient,
        embedding_model: &str,
    ) -> Result<Vec<Chunk>, ProviderError> {
        let entries = sources_for(domain);
        let mut texts = Vec::new();
        let mut provenance: Vec<(&'static str, &'static str, bool)> = Vec::new();

        for entry in &entries {
            let path = Path::new(context_dir).join(entry.relative_path);
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            for chunk_text in chunk_words(content.trim(), cfg.chunk_target_chars as usize, cfg.chunk_overlap_ratio) {
                texts.push(chunk_text);
                provenance.push((entry.name, entry.display_label, entry.required));
            }
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = llm.embed_batch(embedding_model, &texts).await?;
        Ok(texts
            .into_iter()
            .zip(embeddings)
            .zip(provenance)
            .map(|((text, embedding), (name, label, required))| Chunk {
                text,
                source_name: name,
                source_display_name: label,
                required_source: required,
                embedding,
            })
            .collect())
    }

    async fn ensure_loaded(
        &self,
        domain: Domain,
        context_dir: &str,
        cfg: &RetrievalConfig,
        llm: &dyn LlmClient,
        embedding_model: &str,
    ) -> Result<(), ProviderError> {
        {
            let loaded = self.loaded.lock().unwrap();
            if loaded.contains_key(&domain) {
                return Ok(());
            }
        }

        let sources_hash = digest_sources(context_dir, domain);
        if let Some(chunks) = self.read_from_disk(domain, cfg, &sources_hash) {
            self.loaded.lock().unwrap().insert(domain, chunks);
            return Ok(());
        }

        let chunks = self.build_chunks(domain, context_dir, cfg, llm, embedding_model).await?;
        let _ = self.write_to_disk(domain, cfg, &sources_hash, &chunks);
        self.loaded.lock().unwrap().insert(domain, chunks);
        Ok(())
    }

    /// Optional pre-warm entry point, invoked at startup for configured
    /// domains so the first real request doesn't pay the embedding cost.
    pub async fn prewarm(
        &self,
        domain: Domain,
        context_dir: &str,
        cfg: &RetrievalConfig,
        llm: &dyn LlmClient,
        embedding_model: &str,
    ) -> Result<(), ProviderError> {
        self.ensure_loaded(domain, context_dir, cfg, llm, embedding_model).await
    }

    pub async fn retrieve(
        &self,
        domain: Domain,
        query: &str,
        context_dir: &str,
        cfg: &RetrievalConfig,
        llm: &dyn LlmClient,
        embedding_model: &str,
    ) -> Result<ContextResult, ProviderError> {
        if domain == Domain::OutOfScope {
            return Ok(ContextResult::empty());
        }

        self.ensure_loaded(domain, context_dir, cfg, llm, embedding_model).await?;
        let query_embedding = llm.embed(embedding_model, query).await?;

        let loaded = self.loaded.lock().unwrap();
        let chunks = loaded.get(&domain).cloned().unwrap_or_default();
        drop(loaded);

        if chunks.is_empty() {
            return Ok(ContextResult::empty());
        }

        let mut seen_text = std::collections::HashSet::new();
        let mut sections = Vec::new();
        let mut loaded_sources = Vec::new();

        let overview_n = cfg.overview_chunks_per_source as usize;
        let mut by_source: HashMap<&'static str, usize> = HashMap::new();
        for chunk in chunks.iter().filter(|c| c.required_source) {
            let count = by_source.entry(chunk.source_name).or_insert(0);
            if *count >= overview_n {
                continue;
            }
            if seen_text.insert(chunk.text.clone()) {
                sections.push(format!("## {} (overview)\n\n{}", chunk.source_display_name, chunk.text));
                if !loaded_sources.contains(&chunk.source_name) {
                    loaded_sources.push(chunk.source_name);
                }
            }
            *count += 1;
        }

        let mut scored: Vec<(f32, &Chunk)> = chunks
            .iter()
            .filter(|c| !seen_text.contains(&c.text))
            .map(|c| (cosine_similarity(&query_embedding, &c.embedding), c))
            .filter(|(score, _)| *score >= cfg.similarity_floor as f32)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(cfg.top_k as usize);

        for (score, chunk) in scored {
            if !seen_text.insert(chunk.text.clone()) {
                continue;
            }
            sections.push(format!(
                "## {} (similarity {:.2})\n\n{}",
                chunk.source_display_name, score, chunk.text
            ));
            if !loaded_sources.contains(&chunk.source_name) {
                loaded_sources.push(chunk.source_name);
            }
        }

        let blob = sections.join("\n\n");
        let all_sources: Vec<&'static str> = sources_for(domain).iter().map(|e| e.name).collect();
        let missing_sources: Vec<&'static str> =
            all_sources.into_iter().filter(|n| !loaded_sources.contains(n)).collect();

        let quality = quality_score(blob.chars().count(), loaded_sources.len(), missing_sources.len());
        let status = if blob.is_empty() {
            ContextStatus::NoContext
        } else if !missing_sources.is_empty() {
            ContextStatus::Partial
        } else {
            ContextStatus::Success
        };

        Ok(ContextResult {
            blob,
            quality,
            status,
            loaded_sources,
            missing_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_dimension_mismatch_is_zero_not_error() {
        // mismatched, non-zero vectors that are orthogonal on the shared prefix
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn chunking_produces_overlapping_windows() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_words(text, 15, 0.25);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn chunking_empty_text_yields_no_chunks() {
        assert!(chunk_words("   ", 500, 0.25).is_empty());
    }

    #[test]
    fn digest_changes_when_source_size_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("hobbies")).unwrap();
        std::fs::write(dir.path().join("hobbies/hobbies.md"), "short").unwrap();
        let d1 = digest_sources(dir.path().to_str().unwrap(), Domain::Hobbies);
        std::fs::write(dir.path().join("hobbies/hobbies.md"), "a longer body of text now").unwrap();
        let d2 = digest_sources(dir.path().to_str().unwrap(), Domain::Hobbies);
        assert_ne!(d1, d2);
    }
}
