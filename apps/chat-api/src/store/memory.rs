//! In-memory [`ChatStore`] backing a single-process deployment.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use palaver_common::model::{Chat, Message, MessageStatus, User};

use crate::error::ApiError;

use super::{ChatStore, MessagePage};

#[derive(Default)]
struct Inner {
    /// Insertion-ordered, like the lists a database would return.
    users: Vec<User>,
    chats: Vec<Chat>,
    messages: Vec<Message>,
    /// user id -> password digest.
    credentials: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryChatStore {
    inner: RwLock<Inner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, ApiError> {
        let inner = self.inner.read();
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let inner = self.inner.read();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: User, password_digest: String) -> Result<(), ApiError> {
        let mut inner = self.inner.write();
        inner.credentials.insert(user.id.clone(), password_digest);
        inner.users.push(user);
        Ok(())
    }

    async fn password_digest(&self, user_id: &str) -> Result<Option<String>, ApiError> {
        let inner = self.inner.read();
        Ok(inner.credentials.get(user_id).cloned())
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, ApiError> {
        let inner = self.inner.read();
        Ok(inner
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError> {
        let inner = self.inner.read();
        Ok(inner.chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, ApiError> {
        let inner = self.inner.read();
        Ok(inner
            .chats
            .iter()
            .filter(|c| c.participants.iter().any(|p| p == user_id))
            .cloned()
            .collect())
    }

    async fn insert_chat(&self, chat: Chat) -> Result<(), ApiError> {
        self.inner.write().chats.push(chat);
        Ok(())
    }

    async fn update_chat(&self, chat: Chat) -> Result<(), ApiError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.chats.iter_mut().find(|c| c.id == chat.id) {
            *existing = chat;
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<bool, ApiError> {
        let mut inner = self.inner.write();
        let before = inner.chats.len();
        inner.chats.retain(|c| c.id != chat_id);
        if inner.chats.len() == before {
            return Ok(false);
        }
        inner.messages.retain(|m| m.chat_id != chat_id);
        Ok(true)
    }

    async fn append_message(&self, message: Message) -> Result<(), ApiError> {
        self.inner.write().messages.push(message);
        Ok(())
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, ApiError> {
        let inner = self.inner.read();
        Ok(inner.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn update_message(&self, message: Message) -> Result<(), ApiError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<Option<Message>, ApiError> {
        let mut inner = self.inner.write();
        match inner.messages.iter().position(|m| m.id == message_id) {
            Some(position) => Ok(Some(inner.messages.remove(position))),
            None => Ok(None),
        }
    }

    async fn set_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<Message>, ApiError> {
        let mut inner = self.inner.write();
        match inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.chat_id == chat_id)
        {
            Some(message) => {
                message.status = status;
                Ok(Some(message.clone()))
            }
            None => Ok(None),
        }
    }

    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MessagePage, ApiError> {
        let inner = self.inner.read();
        let mut chat_messages: Vec<&Message> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .collect();
        let total = chat_messages.len();

        // Newest first, take the requested window, then back to chronological.
        chat_messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let mut page: Vec<Message> = chat_messages
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        page.reverse();

        Ok(MessagePage {
            messages: page,
            total,
        })
    }

    async fn set_last_message(
        &self,
        chat_id: &str,
        message: Option<Message>,
    ) -> Result<(), ApiError> {
        let mut inner = self.inner.write();
        if let Some(chat) = inner.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.last_message = message;
        }
        Ok(())
    }
}
