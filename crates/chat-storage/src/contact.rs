//! Append-only flat-file contact message store: one JSON file per
//! message, date-partitioned, owner-only permissions. Messages may
//! contain sender emails, so the 0600 write path is non-negotiable.

use std::path::PathBuf;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::fswrite::{ensure_gitkeep, write_json_0600};
use crate::types::ContactMessage;

pub struct ContactStorage {
    base_dir: PathBuf,
}

impl ContactStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        ensure_gitkeep(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    fn filename(&self, id: &str) -> String {
        format!("{}_{}.json", Utc::now().format("%Y-%m-%d"), id)
    }

    pub fn store(
        &self,
        message: String,
        sender_name: Option<String>,
        sender_email: Option<String>,
        context: Option<String>,
        ip_hash: Option<String>,
        conversation_id: Option<String>,
    ) -> Result<String> {
        let id = Self::generate_id();
        let record = ContactMessage {
            id: id.clone(),
            timestamp: format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f")),
            message,
            sender_name,
            sender_email,
            context,
            ip_hash,
            conversation_id,
        };
        let path = self.base_dir.join(self.filename(&id));
        write_json_0600(&path, &record)?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<ContactMessage> {
        let suffix = format!("_{id}.json");
        let entries = std::fs::read_dir(&self.base_dir).ok()?;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(&suffix) {
                if let Ok(contents) = std::fs::read_to_string(entry.path()) {
                    if let Ok(msg) = serde_json::from_str(&contents) {
                        return Some(msg);
                    }
                }
            }
        }
        None
    }

    /// Best-effort: sorts by filename (date-prefixed) descending, skips and
    /// logs unparseable files rather than failing the whole listing.
    pub fn list_recent(&self, limit: usize) -> Vec<ContactMessage> {
        let mut names: Vec<PathBuf> = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect(),
            Err(_) => return Vec::new(),
        };
        names.sort();
        names.reverse();

        let mut out = Vec::new();
        for path in names.into_iter().take(limit) {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(msg) => out.push(msg),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable contact message"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "failed reading contact message"),
            }
        }
        out
    }

    pub fn count(&self) -> usize {
        std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContactStorage::new(dir.path()).unwrap();
        let id = store
            .store(
                "Tell Kellogg I'm interested".into(),
                None,
                Some("jane@example.com".into()),
                None,
                Some("iphash".into()),
                Some("conv-1".into()),
            )
            .unwrap();
        let msg = store.get(&id).unwrap();
        assert_eq!(msg.sender_email.as_deref(), Some("jane@example.com"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn list_recent_skips_unparseable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContactStorage::new(dir.path()).unwrap();
        store.store("hello".into(), None, None, None, None, None).unwrap();
        std::fs::write(dir.path().join("2020-01-01_garbage.json"), b"not json").unwrap();
        let recent = store.list_recent(10);
        assert_eq!(recent.len(), 1);
    }
}
