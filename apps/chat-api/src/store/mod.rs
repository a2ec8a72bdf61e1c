//! Persisted chat data behind an injectable trait.
//!
//! The server core only ever talks to [`ChatStore`]; a multi-instance
//! deployment would re-implement it over a shared database without touching
//! the event router.

mod memory;
pub mod seed;

pub use memory::MemoryChatStore;

use async_trait::async_trait;

use palaver_common::model::{Chat, Message, MessageStatus, User};

use crate::error::ApiError;

/// One page of messages: chronological slice plus the chat's total count.
#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: usize,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    // Users
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, ApiError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ApiError>;
    async fn insert_user(&self, user: User, password_digest: String) -> Result<(), ApiError>;
    async fn password_digest(&self, user_id: &str) -> Result<Option<String>, ApiError>;
    /// Resolve a set of user ids to full snapshots, skipping unknown ids.
    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, ApiError>;

    // Chats
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError>;
    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, ApiError>;
    async fn insert_chat(&self, chat: Chat) -> Result<(), ApiError>;
    /// Replace the stored chat with the same id.
    async fn update_chat(&self, chat: Chat) -> Result<(), ApiError>;
    /// Remove a chat and all of its messages. Returns false if unknown.
    async fn delete_chat(&self, chat_id: &str) -> Result<bool, ApiError>;

    // Messages
    async fn append_message(&self, message: Message) -> Result<(), ApiError>;
    async fn get_message(&self, message_id: &str) -> Result<Option<Message>, ApiError>;
    /// Replace the stored message with the same id.
    async fn update_message(&self, message: Message) -> Result<(), ApiError>;
    /// Remove a message by id, returning it if it existed.
    async fn delete_message(&self, message_id: &str) -> Result<Option<Message>, ApiError>;
    /// Set a message's status, returning the updated message if it exists.
    async fn set_message_status(
        &self,
        chat_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<Option<Message>, ApiError>;
    /// The `limit` most recent messages starting `offset` from the newest,
    /// returned oldest-first within the page.
    async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MessagePage, ApiError>;
    /// Replace the chat's cached last message; `None` clears it.
    async fn set_last_message(
        &self,
        chat_id: &str,
        message: Option<Message>,
    ) -> Result<(), ApiError>;
}
