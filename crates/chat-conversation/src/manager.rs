//! In-memory conversation store: a single mutex-guarded map from
//! conversation id to `Conversation`, with turn-limit enforcement and
//! opportunistic TTL cleanup. No database — conversation state is pure
//! process memory, unlike the flat-file analytics log in `chat-storage`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::types::{Conversation, Role};

const CLEANUP_INTERVAL_SECS: f64 = 60.0;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct Inner {
    conversations: HashMap<String, Conversation>,
    last_cleanup: f64,
}

pub struct ConversationManager {
    max_turns: u64,
    ttl_secs: u64,
    inner: Mutex<Inner>,
}

impl ConversationManager {
    pub fn new(max_turns: u64, ttl_secs: u64) -> Self {
        Self {
            max_turns,
            ttl_secs,
            inner: Mutex::new(Inner {
                conversations: HashMap::new(),
                last_cleanup: now_secs(),
            }),
        }
    }

    /// Returns the conversation for `id` if present and unexpired; otherwise
    /// creates one under a **fresh** id. A client-supplied id that is unknown
    /// or expired is never reused — this matches the reference behavior of
    /// always issuing a new identifier rather than silently reviving state.
    pub fn get_or_create(&self, id: Option<&str>) -> Conversation {
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();

        if now - inner.last_cleanup >= CLEANUP_INTERVAL_SECS {
            self.cleanup_expired_locked(&mut inner, now);
            inner.last_cleanup = now;
        }

        if let Some(id) = id {
            if let Some(conv) = inner.conversations.get(id) {
                if !conv.is_expired(self.ttl_secs, now) {
                    return conv.clone();
                }
                inner.conversations.remove(id);
            }
        }

        let fresh_id = Uuid::new_v4().to_string();
        let conv = Conversation::new(fresh_id.clone(), now);
        inner.conversations.insert(fresh_id, conv.clone());
        conv
    }

    /// Append a message. Turn limit is enforced only on `user`-role additions.
    /// Returns `false` (without mutating) if the limit is already reached.
    pub fn add_message(&self, id: &str, role: Role, content: String) -> bool {
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();
        let Some(conv) = inner.conversations.get_mut(id) else {
            return false;
        };
        if role == Role::User && conv.turn_count() as u64 >= self.max_turns {
            return false;
        }
        conv.add_message(role, content, now);
        true
    }

    /// Appends a completed user/assistant exchange under a single lock
    /// acquisition. Per §5, a successful request must atomically append
    /// both messages so history never contains a user message without
    /// its paired assistant message (or vice versa), and so two
    /// concurrent requests on the same conversation id can't interleave
    /// their pairs into a non-contiguous `user, user, assistant, assistant`
    /// order. The turn limit is checked once, before either message is
    /// appended — if it's already reached, neither message is appended.
    pub fn add_exchange(&self, id: &str, user_content: String, assistant_content: String) -> bool {
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();
        let Some(conv) = inner.conversations.get_mut(id) else {
            return false;
        };
        if conv.turn_count() as u64 >= self.max_turns {
            return false;
        }
        conv.add_message(Role::User, user_content, now);
        conv.add_message(Role::Assistant, assistant_content, now);
        true
    }

    pub fn check_turn_limit(&self, id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.conversations.get(id) {
            Some(conv) => (conv.turn_count() as u64) < self.max_turns,
            None => true,
        }
    }

    /// Public, on-demand sweep — returns the number of conversations removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_secs();
        let mut inner = self.inner.lock().unwrap();
        self.cleanup_expired_locked(&mut inner, now)
    }

    fn cleanup_expired_locked(&self, inner: &mut Inner, now: f64) -> usize {
        let ttl = self.ttl_secs;
        let before = inner.conversations.len();
        inner.conversations.retain(|_, c| !c.is_expired(ttl, now));
        before - inner.conversations.len()
    }

    pub fn delete_conversation(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.conversations.remove(id).is_some()
    }

    pub fn get_stats(&self) -> (usize, u64, u64) {
        let inner = self.inner.lock().unwrap();
        (inner.conversations.len(), self.max_turns, self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_issues_fresh_conversation() {
        let mgr = ConversationManager::new(10, 1800);
        let conv = mgr.get_or_create(Some("does-not-exist"));
        assert_ne!(conv.id, "does-not-exist");
    }

    #[test]
    fn existing_id_is_reused() {
        let mgr = ConversationManager::new(10, 1800);
        let conv = mgr.get_or_create(None);
        let again = mgr.get_or_create(Some(&conv.id));
        assert_eq!(conv.id, again.id);
    }

    #[test]
    fn turn_limit_blocks_further_user_messages() {
        let mgr = ConversationManager::new(1, 1800);
        let conv = mgr.get_or_create(None);
        assert!(mgr.add_message(&conv.id, Role::User, "hi".into()));
        assert!(mgr.add_message(&conv.id, Role::Assistant, "hello".into()));
        assert!(!mgr.add_message(&conv.id, Role::User, "again".into()));
    }

    #[test]
    fn successful_exchange_grows_history_by_two() {
        let mgr = ConversationManager::new(10, 1800);
        let conv = mgr.get_or_create(None);
        mgr.add_message(&conv.id, Role::User, "hi".into());
        mgr.add_message(&conv.id, Role::Assistant, "hello".into());
        let reloaded = mgr.get_or_create(Some(&conv.id));
        assert_eq!(reloaded.messages.len(), 2);
    }

    #[test]
    fn blocked_add_does_not_mutate_history() {
        let mgr = ConversationManager::new(1, 1800);
        let conv = mgr.get_or_create(None);
        mgr.add_message(&conv.id, Role::User, "hi".into());
        mgr.add_message(&conv.id, Role::Assistant, "hello".into());
        assert!(!mgr.add_message(&conv.id, Role::User, "blocked".into()));
        let reloaded = mgr.get_or_create(Some(&conv.id));
        assert_eq!(reloaded.messages.len(), 2);
    }

    #[test]
    fn add_exchange_appends_both_messages_contiguously() {
        let mgr = ConversationManager::new(10, 1800);
        let conv = mgr.get_or_create(None);
        assert!(mgr.add_exchange(&conv.id, "hi".into(), "hello".into()));
        let reloaded = mgr.get_or_create(Some(&conv.id));
        assert_eq!(reloaded.messages.len(), 2);
        assert_eq!(reloaded.messages[0].role, Role::User);
        assert_eq!(reloaded.messages[1].role, Role::Assistant);
    }

    #[test]
    fn add_exchange_at_turn_limit_appends_neither_message() {
        let mgr = ConversationManager::new(1, 1800);
        let conv = mgr.get_or_create(None);
        assert!(mgr.add_exchange(&conv.id, "hi".into(), "hello".into()));
        assert!(!mgr.add_exchange(&conv.id, "again".into(), "should not appear".into()));
        let reloaded = mgr.get_or_create(Some(&conv.id));
        assert_eq!(reloaded.messages.len(), 2);
    }

    #[test]
    fn add_exchange_on_unknown_id_returns_false() {
        let mgr = ConversationManager::new(10, 1800);
        assert!(!mgr.add_exchange("does-not-exist", "hi".into(), "hello".into()));
    }
}
