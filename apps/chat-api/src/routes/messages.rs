//! Message routes: paged history, plain HTTP send, and per-message
//! edit/delete/read (no broadcasts).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use palaver_common::id::{prefix, prefixed_ulid};
use palaver_common::model::{
    Attachment, Message, MessageKind, MessageStatus, Reaction, User,
};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(send_message))
        .route("/messages/{id}", put(edit_message).delete(delete_message))
        .route("/messages/{id}/read", post(mark_message_read))
}

const DEFAULT_PAGE_LIMIT: usize = 50;
const EDIT_WINDOW_MINUTES: i64 = 15;
const DELETE_WINDOW_MINUTES: i64 = 5;

/// A message with its sender id expanded to a user snapshot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithSender {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<User>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub type_: MessageKind,
    pub status: MessageStatus,
    pub reactions: Vec<Reaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl MessageWithSender {
    fn new(message: Message, sender: Option<User>) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            sender,
            content: message.content,
            timestamp: message.timestamp,
            type_: message.type_,
            status: message.status,
            reactions: message.reactions,
            reply_to: message.reply_to,
            attachments: message.attachments,
            edited: message.edited,
            edited_at: message.edited_at,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/messages?chatId&limit&offset
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub chat_id: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageWithSender>,
    pub total: usize,
    pub has_more: bool,
}

#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "Messages",
    params(
        ("chatId" = String, Query, description = "Chat id"),
        ("limit" = Option<usize>, Query, description = "Page size, default 50"),
        ("offset" = Option<usize>, Query, description = "Offset from the newest message"),
    ),
    responses(
        (status = 200, description = "One page of messages, oldest-first", body = ListMessagesResponse),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let chat = state
        .store
        .get_chat(&query.chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.participants.contains(&auth.user.id) {
        return Err(ApiError::forbidden("Access denied"));
    }

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let page = state
        .store
        .recent_messages(&query.chat_id, limit, offset)
        .await?;

    let mut messages = Vec::with_capacity(page.messages.len());
    for message in page.messages {
        let sender = state.store.get_user(&message.sender_id).await?;
        messages.push(MessageWithSender::new(message, sender));
    }

    Ok(Json(ListMessagesResponse {
        messages,
        total: page.total,
        has_more: offset.saturating_add(limit) < page.total,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageEnvelope {
    pub message: MessageWithSender,
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "Messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message appended", body = MessageEnvelope),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageEnvelope>), ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let chat = state
        .store
        .get_chat(&body.chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.participants.contains(&auth.user.id) {
        return Err(ApiError::forbidden("Access denied"));
    }

    let message = Message {
        id: prefixed_ulid(prefix::MESSAGE),
        chat_id: body.chat_id.clone(),
        sender_id: auth.user.id.clone(),
        content: body.content,
        timestamp: Utc::now(),
        type_: MessageKind::Text,
        status: MessageStatus::Sent,
        reactions: vec![],
        reply_to: None,
        attachments: None,
        edited: Some(false),
        edited_at: None,
    };
    state.store.append_message(message.clone()).await?;
    state
        .store
        .set_last_message(&body.chat_id, Some(message.clone()))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageEnvelope {
            message: MessageWithSender::new(message, Some(auth.user)),
        }),
    ))
}

// ---------------------------------------------------------------------------
// PUT /api/messages/{id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditMessageRequest {
    pub content: String,
}

#[utoipa::path(
    put,
    path = "/api/messages/{id}",
    tag = "Messages",
    params(("id" = String, Path, description = "Message id")),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Message updated", body = MessageEnvelope),
        (status = 400, description = "Validation failed or edit window expired", body = ApiErrorBody),
        (status = 403, description = "Not the sender", body = ApiErrorBody),
        (status = 404, description = "Unknown message", body = ApiErrorBody),
    ),
)]
pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let mut message = state
        .store
        .get_message(&message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    if message.sender_id != auth.user.id {
        return Err(ApiError::forbidden("Access denied"));
    }
    if Utc::now() - message.timestamp > Duration::minutes(EDIT_WINDOW_MINUTES) {
        return Err(ApiError::bad_request("Message is too old to edit"));
    }

    message.content = body.content;
    message.edited = Some(true);
    message.edited_at = Some(Utc::now());
    state.store.update_message(message.clone()).await?;

    // Keep the chat's cached preview in sync when the newest message changed.
    if let Some(chat) = state.store.get_chat(&message.chat_id).await? {
        if chat.last_message.is_some_and(|m| m.id == message.id) {
            state
                .store
                .set_last_message(&message.chat_id, Some(message.clone()))
                .await?;
        }
    }

    Ok(Json(MessageEnvelope {
        message: MessageWithSender::new(message, Some(auth.user)),
    }))
}

// ---------------------------------------------------------------------------
// DELETE /api/messages/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    tag = "Messages",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message removed"),
        (status = 400, description = "Delete window expired", body = ApiErrorBody),
        (status = 403, description = "Not the sender", body = ApiErrorBody),
        (status = 404, description = "Unknown message", body = ApiErrorBody),
    ),
)]
pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let message = state
        .store
        .get_message(&message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;
    if message.sender_id != auth.user.id {
        return Err(ApiError::forbidden("Access denied"));
    }
    if Utc::now() - message.timestamp > Duration::minutes(DELETE_WINDOW_MINUTES) {
        return Err(ApiError::bad_request("Message is too old to delete"));
    }

    state.store.delete_message(&message_id).await?;

    // If this was the chat's newest message, fall back to the next-newest.
    if let Some(chat) = state.store.get_chat(&message.chat_id).await? {
        if chat.last_message.is_some_and(|m| m.id == message.id) {
            let page = state.store.recent_messages(&message.chat_id, 1, 0).await?;
            state
                .store
                .set_last_message(&message.chat_id, page.messages.into_iter().next())
                .await?;
        }
    }

    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// POST /api/messages/{id}/read
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/messages/{id}/read",
    tag = "Messages",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked as read"),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown message", body = ApiErrorBody),
    ),
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let message = state
        .store
        .get_message(&message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    let participant = state
        .store
        .get_chat(&message.chat_id)
        .await?
        .is_some_and(|chat| chat.participants.contains(&auth.user.id));
    if !participant {
        return Err(ApiError::forbidden("Access denied"));
    }

    state
        .store
        .set_message_status(&message.chat_id, &message_id, MessageStatus::Read)
        .await?;

    Ok(Json(json!({ "success": true })))
}
