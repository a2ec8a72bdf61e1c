//! Active-subscription index: who receives a chat's events right now.
//!
//! Distinct from a chat's persisted participant list (who is *allowed* in).
//! Membership is reference-counted per (chat, user) across connections, so a
//! user with two tabs open stays an active member until the last one leaves.
//! The index performs no authorization; callers verify participation first.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

pub struct MembershipIndex {
    /// chat id -> user id -> live connection count.
    chats: DashMap<String, HashMap<String, usize>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self {
            chats: DashMap::new(),
        }
    }

    /// Count one more connection for (chat, user). Returns true when the
    /// user went from zero to one live connection in that chat, i.e. became
    /// newly active (the caller broadcasts presence only then).
    pub fn join(&self, chat_id: &str, user_id: &str) -> bool {
        let mut members = self.chats.entry(chat_id.to_string()).or_default();
        let count = members.entry(user_id.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Count one connection down for (chat, user). Returns true when the
    /// user's last connection in that chat left (went inactive). Leaving a
    /// chat the user never joined is a no-op. The chat entry is dropped
    /// entirely once its last member leaves.
    pub fn leave(&self, chat_id: &str, user_id: &str) -> bool {
        let Some(mut members) = self.chats.get_mut(chat_id) else {
            return false;
        };
        let became_inactive = match members.get_mut(user_id) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    members.remove(user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        let empty = members.is_empty();
        drop(members);
        if empty {
            self.chats.remove_if(chat_id, |_, members| members.is_empty());
        }
        became_inactive
    }

    /// The set of currently-active user ids in a chat.
    pub fn members_of(&self, chat_id: &str) -> HashSet<String> {
        match self.chats.get(chat_id) {
            Some(members) => members.keys().cloned().collect(),
            None => HashSet::new(),
        }
    }

    pub fn is_member(&self, chat_id: &str, user_id: &str) -> bool {
        match self.chats.get(chat_id) {
            Some(members) => members.contains_key(user_id),
            None => false,
        }
    }

    /// Number of chats with at least one active member.
    pub fn active_chats(&self) -> usize {
        self.chats.len()
    }
}

impl Default for MembershipIndex {
    fn default() -> Self {
        Self::new()
    }
}
