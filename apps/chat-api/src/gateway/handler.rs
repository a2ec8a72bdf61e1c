//! Event router: dispatches decoded client messages and runs the
//! disconnect path.

use chrono::Utc;

use palaver_common::id::{prefix, prefixed_ulid};
use palaver_common::model::{Message, MessageKind, MessageStatus};
use palaver_common::proto::{
    now_ms, ChatHistoryPayload, ChatJoinedPayload, ChatLeftPayload, ChatTarget, ClientMessage,
    HistoryRequest, MarkReadPayload, MessageReadPayload, MessageSentPayload, NewMessagePayload,
    SendMessagePayload, ServerEvent, TypingStartPayload, TypingStopPayload, UserJoinedPayload,
    UserPresencePayload,
};

use crate::AppState;

use super::fanout;

/// Default page size for `get_chat_history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Handle one inbound message to completion, including any broadcasts it
/// triggers. A connection's messages arrive here serially, so its effects
/// are ordered.
pub async fn handle_message(state: &AppState, connection_id: &str, message: ClientMessage) {
    match message {
        ClientMessage::JoinChat(payload) => handle_join_chat(state, connection_id, payload).await,
        ClientMessage::LeaveChat(payload) => handle_leave_chat(state, connection_id, payload),
        ClientMessage::SendMessage(payload) => {
            handle_send_message(state, connection_id, payload).await
        }
        ClientMessage::TypingStart(payload) => handle_typing_start(state, connection_id, payload),
        ClientMessage::TypingStop(payload) => handle_typing_stop(state, connection_id, payload),
        ClientMessage::MarkRead(payload) => handle_mark_read(state, connection_id, payload).await,
        ClientMessage::GetChatHistory(payload) => {
            handle_get_chat_history(state, connection_id, payload).await
        }
        // Heartbeat keep-alive: no state change, no reply.
        ClientMessage::Ping(_) => {}
    }
}

/// Send a sender-directed error event. Errors are never broadcast.
pub fn send_error(state: &AppState, connection_id: &str, message: impl Into<String>) {
    if !fanout::to_connection(&state.registry, connection_id, &ServerEvent::error(message)) {
        disconnect(state, connection_id);
    }
}

async fn handle_join_chat(state: &AppState, connection_id: &str, payload: ChatTarget) {
    let ChatTarget { chat_id } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    let chat = match state.store.get_chat(&chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => {
            send_error(state, connection_id, "Chat not found");
            return;
        }
        Err(err) => {
            tracing::error!(?err, %chat_id, "chat lookup failed");
            send_error(state, connection_id, "Internal server error");
            return;
        }
    };

    // Authorization is against the persisted participant list, at join time.
    if !chat.participants.contains(&user.id) {
        send_error(state, connection_id, "Access denied to this chat");
        return;
    }

    // A duplicate join from the same connection changes nothing.
    if state.registry.add_chat(connection_id, &chat_id)
        && state.membership.join(&chat_id, &user.id)
    {
        // First live connection for this user in this chat: announce it to
        // the rest of the room, not to the joiner.
        let event = ServerEvent::UserJoined(UserJoinedPayload {
            chat_id: chat_id.clone(),
            user: user.clone(),
            timestamp: now_ms(),
        });
        let failed = fanout::to_chat(
            &state.registry,
            &state.membership,
            &chat_id,
            &event,
            &[user.id.clone()],
        );
        reap(state, failed);
    }

    let reply = ServerEvent::ChatJoined(ChatJoinedPayload {
        chat_id,
        chat,
        timestamp: now_ms(),
    });
    if !fanout::to_connection(&state.registry, connection_id, &reply) {
        disconnect(state, connection_id);
    }
}

fn handle_leave_chat(state: &AppState, connection_id: &str, payload: ChatTarget) {
    let ChatTarget { chat_id } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    if state.registry.remove_chat(connection_id, &chat_id)
        && state.membership.leave(&chat_id, &user.id)
    {
        let event = ServerEvent::UserLeft(UserPresencePayload {
            chat_id: chat_id.clone(),
            user_id: user.id.clone(),
            timestamp: now_ms(),
        });
        let failed = fanout::to_chat(
            &state.registry,
            &state.membership,
            &chat_id,
            &event,
            &[user.id.clone()],
        );
        reap(state, failed);
    }

    // Acked unconditionally, even when the connection never joined.
    let reply = ServerEvent::ChatLeft(ChatLeftPayload {
        chat_id,
        timestamp: now_ms(),
    });
    if !fanout::to_connection(&state.registry, connection_id, &reply) {
        disconnect(state, connection_id);
    }
}

async fn handle_send_message(state: &AppState, connection_id: &str, payload: SendMessagePayload) {
    let SendMessagePayload { chat_id, content } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    // Gated on this connection having joined, not on the participant list.
    if !state.registry.has_chat(connection_id, &chat_id) {
        send_error(state, connection_id, "You are not in this chat");
        return;
    }

    let message = Message {
        id: prefixed_ulid(prefix::MESSAGE),
        chat_id: chat_id.clone(),
        sender_id: user.id.clone(),
        content,
        timestamp: Utc::now(),
        type_: MessageKind::Text,
        status: MessageStatus::Sent,
        reactions: vec![],
        reply_to: None,
        attachments: None,
        edited: None,
        edited_at: None,
    };

    if let Err(err) = state.store.append_message(message.clone()).await {
        tracing::error!(?err, %chat_id, "message append failed");
        send_error(state, connection_id, "Internal server error");
        return;
    }
    if let Err(err) = state
        .store
        .set_last_message(&chat_id, Some(message.clone()))
        .await
    {
        tracing::error!(?err, %chat_id, "last-message update failed");
    }

    // Everyone in the chat, sender included, gets the authoritative copy;
    // the ack goes to the sender alone so it can reconcile its local echo.
    let broadcast = ServerEvent::NewMessage(NewMessagePayload {
        message: message.clone(),
        timestamp: now_ms(),
    });
    let failed = fanout::to_chat(&state.registry, &state.membership, &chat_id, &broadcast, &[]);
    reap(state, failed);

    let ack = ServerEvent::MessageSent(MessageSentPayload {
        message_id: message.id,
        timestamp: now_ms(),
    });
    if !fanout::to_connection(&state.registry, connection_id, &ack) {
        disconnect(state, connection_id);
    }
}

fn handle_typing_start(state: &AppState, connection_id: &str, payload: ChatTarget) {
    let ChatTarget { chat_id } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    state.typing.mark(&chat_id, &user.id);

    let event = ServerEvent::TypingStart(TypingStartPayload {
        chat_id: chat_id.clone(),
        user_id: user.id.clone(),
        user: user.clone(),
        timestamp: now_ms(),
    });
    let failed = fanout::to_chat(
        &state.registry,
        &state.membership,
        &chat_id,
        &event,
        &[user.id],
    );
    reap(state, failed);
}

fn handle_typing_stop(state: &AppState, connection_id: &str, payload: ChatTarget) {
    let ChatTarget { chat_id } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    state.typing.clear(&chat_id, &user.id);

    let event = ServerEvent::TypingStop(TypingStopPayload {
        chat_id: chat_id.clone(),
        user_id: user.id.clone(),
        timestamp: now_ms(),
    });
    let failed = fanout::to_chat(
        &state.registry,
        &state.membership,
        &chat_id,
        &event,
        &[user.id],
    );
    reap(state, failed);
}

async fn handle_mark_read(state: &AppState, connection_id: &str, payload: MarkReadPayload) {
    let MarkReadPayload {
        chat_id,
        message_id,
    } = payload;
    let Some(user) = state.registry.user(connection_id) else {
        return;
    };

    let updated = match state
        .store
        .set_message_status(&chat_id, &message_id, MessageStatus::Read)
        .await
    {
        Ok(updated) => updated,
        Err(err) => {
            tracing::error!(?err, %chat_id, %message_id, "mark-read failed");
            send_error(state, connection_id, "Internal server error");
            return;
        }
    };

    // Unknown message: silent no-op. Nothing changed, so nobody hears about it.
    if updated.is_none() {
        return;
    }

    // The whole chat hears about it, the marker included.
    let event = ServerEvent::MessageRead(MessageReadPayload {
        message_id,
        read_by: user.id,
        timestamp: now_ms(),
    });
    let failed = fanout::to_chat(&state.registry, &state.membership, &chat_id, &event, &[]);
    reap(state, failed);
}

async fn handle_get_chat_history(state: &AppState, connection_id: &str, payload: HistoryRequest) {
    let HistoryRequest { chat_id, limit } = payload;
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let page = match state.store.recent_messages(&chat_id, limit, 0).await {
        Ok(page) => page,
        Err(err) => {
            tracing::error!(?err, %chat_id, "history fetch failed");
            send_error(state, connection_id, "Internal server error");
            return;
        }
    };

    let reply = ServerEvent::ChatHistory(ChatHistoryPayload {
        chat_id,
        messages: page.messages,
        timestamp: now_ms(),
    });
    if !fanout::to_connection(&state.registry, connection_id, &reply) {
        disconnect(state, connection_id);
    }
}

/// Tear down a connection: unregister it, release its chat memberships, and
/// notify each chat where the user's last connection just left. Safe to call
/// from any path (close frame, transport error, delivery failure) and
/// idempotent.
///
/// Cleanup broadcasts can themselves hit dead peers; the worklist keeps
/// going until every discovered casualty is unregistered.
pub fn disconnect(state: &AppState, connection_id: &str) {
    let mut pending = vec![connection_id.to_string()];

    while let Some(id) = pending.pop() {
        let Some(connection) = state.registry.unregister(&id) else {
            continue;
        };
        tracing::debug!(
            connection_id = %connection.connection_id,
            user_id = %connection.user_id,
            "connection closed"
        );

        for chat_id in &connection.chat_ids {
            if state.membership.leave(chat_id, &connection.user_id) {
                let event = ServerEvent::UserOffline(UserPresencePayload {
                    chat_id: chat_id.clone(),
                    user_id: connection.user_id.clone(),
                    timestamp: now_ms(),
                });
                pending.extend(fanout::to_chat(
                    &state.registry,
                    &state.membership,
                    chat_id,
                    &event,
                    &[],
                ));
            }
        }
    }
}

/// Run the disconnect path for every connection whose delivery failed.
fn reap(state: &AppState, failed: Vec<String>) {
    for connection_id in failed {
        disconnect(state, &connection_id);
    }
}
