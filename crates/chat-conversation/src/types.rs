use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: f64,
}

/// An in-memory, turn-limited, TTL-expiring multi-turn conversation.
/// Never touches disk — this is distinct from the flat-file conversation
/// analytics log kept by `chat-storage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: f64,
    pub last_activity: f64,
}

impl Conversation {
    pub fn new(id: String, now: f64) -> Self {
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn add_message(&mut self, role: Role, content: String, now: f64) {
        self.messages.push(Message {
            role,
            content,
            timestamp: now,
        });
        self.last_activity = now;
    }

    pub fn turn_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn is_expired(&self, ttl_secs: u64, now: f64) -> bool {
        now - self.last_activity > ttl_secs as f64
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }
}
