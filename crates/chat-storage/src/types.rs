use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

/// Audit trail for one conversation: written through on every turn.
/// Date-partitioned by `started_at`, not by the date of the current write,
/// so a conversation spanning midnight stays in the directory it began in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLog {
    pub id: String,
    pub started_at: f64,
    pub last_activity: f64,
    pub ip_hash: String,
    pub total_turns: u64,
    pub domains_used: Vec<String>,
    pub total_response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_at_layer: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    pub fn new(id: String, ip_hash: String, now: f64) -> Self {
        Self {
            id,
            started_at: now,
            last_activity: now,
            ip_hash,
            total_turns: 0,
            domains_used: Vec::new(),
            total_response_time_ms: 0.0,
            blocked_at_layer: None,
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: String,
    pub timestamp: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}
