//! Write-through flat-file conversation analytics store: one JSON file
//! per conversation, partitioned by the date the conversation *started*.
//! The in-memory cache of recently touched logs is a latency optimization
//! only — every `log_message` call flushes to disk before returning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::fswrite::{ensure_gitkeep, write_json_0600};
use crate::types::{ConversationLog, ConversationMessage};

pub struct ConversationStorage {
    base_dir: PathBuf,
    cache: Mutex<HashMap<String, ConversationLog>>,
}

impl ConversationStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        ensure_gitkeep(&base_dir)?;
        Ok(Self {
            base_dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn date_dir(&self, started_at: f64) -> PathBuf {
        let dt = DateTime::<Utc>::from_timestamp(started_at as i64, 0).unwrap_or_else(Utc::now);
        self.base_dir.join(dt.format("%Y-%m-%d").to_string())
    }

    fn filepath(&self, id: &str, started_at: f64) -> PathBuf {
        self.date_dir(started_at).join(format!("conv_{id}.json"))
    }

    /// Searches date directories (most recent first) for `conv_{id}.json`.
    fn find_on_disk(&self, id: &str) -> Option<ConversationLog> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs.reverse();

        let target = format!("conv_{id}.json");
        for dir in dirs {
            let path = dir.join(&target);
            if path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    if let Ok(log) = serde_json::from_str::<ConversationLog>(&contents) {
                        return Some(log);
                    }
                }
            }
        }
        None
    }

    /// Append one message and persist the updated log, write-through.
    pub fn log_message(
        &self,
        id: &str,
        ip_hash: &str,
        role: &str,
        content: &str,
        domain: Option<&str>,
        response_time_ms: Option<f64>,
        now: f64,
    ) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();

        let mut log = if let Some(existing) = cache.get(id).cloned() {
            existing
        } else if let Some(from_disk) = self.find_on_disk(id) {
            from_disk
        } else {
            ConversationLog::new(id.to_string(), ip_hash.to_string(), now)
        };

        log.last_activity = now;
        log.messages.push(ConversationMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: now,
            domain: domain.map(|d| d.to_string()),
            response_time_ms,
        });

        if role == "assistant" {
            log.total_turns += 1;
            if let Some(d) = domain {
                if !log.domains_used.iter().any(|existing| existing == d) {
                    log.domains_used.push(d.to_string());
                }
            }
            if let Some(ms) = response_time_ms {
                log.total_response_time_ms += ms;
            }
        }

        let path = self.filepath(id, log.started_at);
        write_json_0600(&path, &log)?;
        cache.insert(id.to_string(), log);
        Ok(())
    }

    pub fn mark_blocked(&self, id: &str, ip_hash: &str, layer: &str, now: f64) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let mut log = cache
            .get(id)
            .cloned()
            .or_else(|| self.find_on_disk(id))
            .unwrap_or_else(|| ConversationLog::new(id.to_string(), ip_hash.to_string(), now));
        log.blocked_at_layer = Some(layer.to_string());
        log.last_activity = now;
        let path = self.filepath(id, log.started_at);
        write_json_0600(&path, &log)?;
        cache.insert(id.to_string(), log);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ConversationLog> {
        if let Some(cached) = self.cache.lock().unwrap().get(id).cloned() {
            return Some(cached);
        }
        self.find_on_disk(id)
    }

    /// Loads all matching files into memory, then sorts by `last_activity`
    /// descending before slicing. Not lazy/streamed — acceptable for a
    /// hand-curated, low-volume analytics log.
    pub fn list_recent(&self, limit: usize, offset: usize) -> Vec<ConversationLog> {
        let mut all = Vec::new();
        if let Ok(dirs) = std::fs::read_dir(&self.base_dir) {
            for dir in dirs.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()) {
                if let Ok(files) = std::fs::read_dir(&dir) {
                    for file in files.filter_map(|e| e.ok()) {
                        let path = file.path();
                        if path.extension().and_then(|e| e.to_str()) != Some("json") {
                            continue;
                        }
                        match std::fs::read_to_string(&path) {
                            Ok(contents) => match serde_json::from_str::<ConversationLog>(&contents) {
                                Ok(log) => all.push(log),
                                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable conversation log"),
                            },
                            Err(e) => warn!(path = %path.display(), error = %e, "failed reading conversation log"),
                        }
                    }
                }
            }
        }
        all.sort_by(|a, b| b.last_activity.partial_cmp(&a.last_activity).unwrap_or(std::cmp::Ordering::Equal));
        all.into_iter().skip(offset).take(limit).collect()
    }

    pub fn count(&self) -> usize {
        self.list_recent(usize::MAX, 0).len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    #[cfg(test)]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_message_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStorage::new(dir.path()).unwrap();
        store.log_message("c1", "iphash", "user", "hello", None, None, 1000.0).unwrap();
        store
            .log_message("c1", "iphash", "assistant", "hi there", Some("professional"), Some(120.0), 1001.0)
            .unwrap();
        let log = store.get("c1").unwrap();
        assert_eq!(log.messages.len(), 2);
        assert_eq!(log.total_turns, 1);
        assert_eq!(log.domains_used, vec!["professional".to_string()]);
    }

    #[test]
    fn cache_is_not_sole_source_of_truth() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStorage::new(dir.path()).unwrap();
        store.log_message("c2", "iphash", "user", "hello", None, None, 1000.0).unwrap();
        store.clear_cache();
        let log = store.get("c2").unwrap();
        assert_eq!(log.messages.len(), 1);
    }
}
