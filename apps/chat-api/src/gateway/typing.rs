//! Self-expiring typing indicators.
//!
//! Entries are refreshed on every `typing_start` and dropped either by an
//! explicit `typing_stop` or by the periodic sweep once they go stale. Both
//! removal paths are idempotent, so an expiry racing an explicit stop
//! converges on the same end state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Idle window after which a typing entry expires; the sweep runs on the
/// same interval.
pub const TYPING_TTL: Duration = Duration::from_secs(5);

pub struct TypingTracker {
    /// chat id -> user id -> last typing_start.
    chats: DashMap<String, HashMap<String, Instant>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            chats: DashMap::new(),
        }
    }

    /// Record or refresh a typing entry at now().
    pub fn mark(&self, chat_id: &str, user_id: &str) {
        self.chats
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string(), Instant::now());
    }

    /// Explicit stop: drop the entry immediately.
    pub fn clear(&self, chat_id: &str, user_id: &str) {
        if let Some(mut users) = self.chats.get_mut(chat_id) {
            users.remove(user_id);
            let empty = users.is_empty();
            drop(users);
            if empty {
                self.chats.remove_if(chat_id, |_, users| users.is_empty());
            }
        }
    }

    /// Users currently marked typing in a chat.
    pub fn typing_in(&self, chat_id: &str) -> Vec<String> {
        match self.chats.get(chat_id) {
            Some(users) => users.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Drop entries older than `max_age` and delete chat maps that become
    /// empty. Returns the number of entries removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        for mut entry in self.chats.iter_mut() {
            let before = entry.len();
            entry.retain(|_, marked_at| now.duration_since(*marked_at) <= max_age);
            removed += before - entry.len();
        }
        self.chats.retain(|_, users| !users.is_empty());

        removed
    }

    #[cfg(test)]
    fn backdate(&self, chat_id: &str, user_id: &str, age: Duration) {
        if let Some(mut users) = self.chats.get_mut(chat_id) {
            if let Some(marked_at) = users.get_mut(user_id) {
                *marked_at = Instant::now() - age;
            }
        }
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
