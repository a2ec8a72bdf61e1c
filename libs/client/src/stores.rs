//! Reactive chat state derived from the event stream.
//!
//! `ChatStores` consumes every [`ServerEvent`] (wire it to a client with
//! [`ChatStores::attach`]) and maintains per-chat message lists, typing
//! indicators, and per-user presence. Getters return clones; no lock is held
//! across handler calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use palaver_common::model::{Message, MessageKind, MessageStatus, UserStatus};
use palaver_common::proto::{EventKind, ServerEvent};

use crate::socket::{ChatClient, ConnectionStatus};
use crate::subscriptions::SubscriptionHandle;

/// Local typing entries expire after the same idle window the server uses,
/// so a lost `typing_stop` cannot wedge the indicator.
const TYPING_EXPIRY: Duration = Duration::from_secs(5);

#[derive(Default)]
struct State {
    /// chat id -> messages, ordered as received, deduplicated by id.
    messages: HashMap<String, Vec<Message>>,
    /// chat id -> user id -> last typing_start.
    typing: HashMap<String, HashMap<String, Instant>>,
    /// user id -> presence derived from join/leave/offline events.
    presence: HashMap<String, UserStatus>,
}

pub struct ChatStores {
    state: Mutex<State>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl Default for ChatStores {
    fn default() -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            state: Mutex::new(State::default()),
            status_tx,
            status_rx,
        }
    }
}

impl ChatStores {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe this store to every event kind on a client. The returned
    /// handles keep the subscriptions alive; drop them to detach.
    pub fn attach(self: &Arc<Self>, client: &ChatClient) -> Vec<SubscriptionHandle> {
        const KINDS: &[EventKind] = &[
            EventKind::Connected,
            EventKind::ChatJoined,
            EventKind::ChatLeft,
            EventKind::UserJoined,
            EventKind::UserLeft,
            EventKind::UserOffline,
            EventKind::NewMessage,
            EventKind::MessageSent,
            EventKind::MessageRead,
            EventKind::TypingStart,
            EventKind::TypingStop,
            EventKind::ChatHistory,
            EventKind::Error,
        ];
        KINDS
            .iter()
            .map(|kind| {
                let stores = Arc::clone(self);
                client.subscribe(*kind, move |event| stores.apply(event))
            })
            .collect()
    }

    /// Mirror of the transport connection state, updated by the caller's own
    /// watch loop on [`ChatClient::status_watch`].
    pub fn set_connection_status(&self, status: ConnectionStatus) {
        let _ = self.status_tx.send(status);
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Fold one event into the state.
    pub fn apply(&self, event: &ServerEvent) {
        let mut state = self.state.lock();
        match event {
            ServerEvent::NewMessage(payload) => {
                Self::insert_message(&mut state, payload.message.clone());
            }
            ServerEvent::ChatHistory(payload) => {
                for message in &payload.messages {
                    Self::insert_message(&mut state, message.clone());
                }
            }
            ServerEvent::MessageSent(payload) => {
                // The authoritative copy arrives via new_message; the ack
                // retires the optimistic echo.
                Self::retire_local_echo(&mut state, &payload.message_id);
            }
            ServerEvent::MessageRead(payload) => {
                for messages in state.messages.values_mut() {
                    if let Some(message) =
                        messages.iter_mut().find(|m| m.id == payload.message_id)
                    {
                        message.status = MessageStatus::Read;
                    }
                }
            }
            ServerEvent::TypingStart(payload) => {
                state
                    .typing
                    .entry(payload.chat_id.clone())
                    .or_default()
                    .insert(payload.user_id.clone(), Instant::now());
            }
            ServerEvent::TypingStop(payload) => {
                if let Some(users) = state.typing.get_mut(&payload.chat_id) {
                    users.remove(&payload.user_id);
                }
            }
            ServerEvent::UserJoined(payload) => {
                state
                    .presence
                    .insert(payload.user.id.clone(), UserStatus::Online);
            }
            ServerEvent::UserLeft(payload) | ServerEvent::UserOffline(payload) => {
                state
                    .presence
                    .insert(payload.user_id.clone(), UserStatus::Offline);
            }
            ServerEvent::Connected(payload) => {
                state
                    .presence
                    .insert(payload.user.id.clone(), UserStatus::Online);
            }
            ServerEvent::ChatJoined(_) | ServerEvent::ChatLeft(_) | ServerEvent::Error(_) => {}
        }
    }

    fn insert_message(state: &mut State, message: Message) {
        let messages = state.messages.entry(message.chat_id.clone()).or_default();
        if messages.iter().any(|m| m.id == message.id) {
            return;
        }
        // The authoritative copy of an optimistic echo replaces it in place.
        if let Some(position) = messages.iter().position(|m| {
            m.id.starts_with("temp-")
                && m.sender_id == message.sender_id
                && m.content == message.content
        }) {
            messages[position] = message;
            return;
        }
        messages.push(message);
    }

    fn retire_local_echo(state: &mut State, _message_id: &str) {
        // If the broadcast raced ahead of the ack there is nothing left to
        // retire; flip any remaining echo to sent.
        for messages in state.messages.values_mut() {
            for message in messages.iter_mut() {
                if message.id.starts_with("temp-") && message.status == MessageStatus::Sending {
                    message.status = MessageStatus::Sent;
                }
            }
        }
    }

    /// Insert an optimistic local echo (`temp-<epoch ms>`, status `sending`)
    /// to display immediately while the round trip completes. Returns the
    /// temporary id.
    pub fn add_local_echo(
        &self,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> String {
        let id = format!("temp-{}", Utc::now().timestamp_millis());
        let message = Message {
            id: id.clone(),
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            type_: MessageKind::Text,
            status: MessageStatus::Sending,
            reactions: vec![],
            reply_to: None,
            attachments: None,
            edited: None,
            edited_at: None,
        };
        let mut state = self.state.lock();
        state
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
        id
    }

    // -- snapshots ----------------------------------------------------------

    pub fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Users typing in a chat right now, expired entries excluded.
    pub fn typing_users(&self, chat_id: &str) -> Vec<String> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let Some(users) = state.typing.get_mut(chat_id) else {
            return Vec::new();
        };
        users.retain(|_, marked_at| now.duration_since(*marked_at) <= TYPING_EXPIRY);
        users.keys().cloned().collect()
    }

    pub fn presence(&self, user_id: &str) -> Option<UserStatus> {
        self.state.lock().presence.get(user_id).copied()
    }
}
