//! Wire-format messages exchanged over the chat WebSocket.
//!
//! Frames are JSON envelopes `{ "type": ..., "data": ... }`. Both unions are
//! modeled as adjacently tagged enums so dispatch is an exhaustive match.
//! Envelope-level `timestamp` fields are epoch milliseconds; model dates are
//! ISO-8601 (see [`crate::model`]).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Chat, Message, User};

/// Epoch milliseconds for event timestamps.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Inbound message types, as they appear on the wire.
pub const INBOUND_TYPES: &[&str] = &[
    "join_chat",
    "leave_chat",
    "send_message",
    "typing_start",
    "typing_stop",
    "mark_read",
    "get_chat_history",
    "ping",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinChat(ChatTarget),
    LeaveChat(ChatTarget),
    SendMessage(SendMessagePayload),
    TypingStart(ChatTarget),
    TypingStop(ChatTarget),
    MarkRead(MarkReadPayload),
    GetChatHistory(HistoryRequest),
    Ping(PingPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTarget {
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Why an inbound frame failed to decode.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Valid envelope, but the `type` is not one we know.
    UnknownType(String),
    /// Not JSON, not an envelope, or a malformed payload for a known type.
    Invalid,
}

/// Decode an inbound text frame.
///
/// Distinguishes an unrecognized `type` (so the caller can echo it back in
/// the error reply) from a frame that is malformed altogether.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::Invalid)?;
    match serde_json::from_value::<ClientMessage>(value.clone()) {
        Ok(msg) => Ok(msg),
        Err(_) => match value.get("type").and_then(Value::as_str) {
            Some(t) if !INBOUND_TYPES.contains(&t) => Err(DecodeError::UnknownType(t.to_string())),
            _ => Err(DecodeError::Invalid),
        },
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    ChatJoined(ChatJoinedPayload),
    ChatLeft(ChatLeftPayload),
    UserJoined(UserJoinedPayload),
    UserLeft(UserPresencePayload),
    UserOffline(UserPresencePayload),
    NewMessage(NewMessagePayload),
    MessageSent(MessageSentPayload),
    MessageRead(MessageReadPayload),
    TypingStart(TypingStartPayload),
    TypingStop(TypingStopPayload),
    ChatHistory(ChatHistoryPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub user: User,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatJoinedPayload {
    pub chat_id: String,
    pub chat: Chat,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLeftPayload {
    pub chat_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedPayload {
    pub chat_id: String,
    pub user: User,
    pub timestamp: i64,
}

/// Shared shape for `user_left` and `user_offline`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresencePayload {
    pub chat_id: String,
    pub user_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub message: Message,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    pub message_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    pub read_by: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStartPayload {
    pub chat_id: String,
    pub user_id: String,
    pub user: User,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStopPayload {
    pub chat_id: String,
    pub user_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryPayload {
    pub chat_id: String,
    pub messages: Vec<Message>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}

/// Discriminant of a [`ServerEvent`], used to key event subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    ChatJoined,
    ChatLeft,
    UserJoined,
    UserLeft,
    UserOffline,
    NewMessage,
    MessageSent,
    MessageRead,
    TypingStart,
    TypingStop,
    ChatHistory,
    Error,
}

impl ServerEvent {
    /// Build a sender-directed error event.
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connected(_) => EventKind::Connected,
            ServerEvent::ChatJoined(_) => EventKind::ChatJoined,
            ServerEvent::ChatLeft(_) => EventKind::ChatLeft,
            ServerEvent::UserJoined(_) => EventKind::UserJoined,
            ServerEvent::UserLeft(_) => EventKind::UserLeft,
            ServerEvent::UserOffline(_) => EventKind::UserOffline,
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::MessageSent(_) => EventKind::MessageSent,
            ServerEvent::MessageRead(_) => EventKind::MessageRead,
            ServerEvent::TypingStart(_) => EventKind::TypingStart,
            ServerEvent::TypingStop(_) => EventKind::TypingStop,
            ServerEvent::ChatHistory(_) => EventKind::ChatHistory,
            ServerEvent::Error(_) => EventKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_join_chat() {
        let msg = decode_client_message(r#"{"type":"join_chat","data":{"chatId":"1"}}"#).unwrap();
        match msg {
            ClientMessage::JoinChat(p) => assert_eq!(p.chat_id, "1"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decode_unknown_type_preserves_name() {
        let err = decode_client_message(r#"{"type":"frobnicate","data":{}}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownType("frobnicate".to_string()));
    }

    #[test]
    fn decode_invalid_json() {
        assert_eq!(
            decode_client_message("not json at all"),
            Err(DecodeError::Invalid)
        );
    }

    #[test]
    fn decode_known_type_with_bad_payload() {
        // join_chat without chatId is malformed, not unknown.
        assert_eq!(
            decode_client_message(r#"{"type":"join_chat","data":{}}"#),
            Err(DecodeError::Invalid)
        );
    }

    #[test]
    fn server_event_envelope_shape() {
        let event = ServerEvent::error("nope");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"]["message"], "nope");
    }

    #[test]
    fn history_limit_is_optional() {
        let msg =
            decode_client_message(r#"{"type":"get_chat_history","data":{"chatId":"1"}}"#).unwrap();
        match msg {
            ClientMessage::GetChatHistory(p) => assert!(p.limit.is_none()),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
