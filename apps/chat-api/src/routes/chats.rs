//! Chat CRUD routes. Participant ids are expanded to full user snapshots in
//! every response.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use palaver_common::id::{prefix, prefixed_ulid};
use palaver_common::model::{Chat, ChatKind, Message, User};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats).post(create_chat))
        .route(
            "/chats/{id}",
            get(get_chat).put(update_chat).delete(delete_chat),
        )
        .route("/chats/{id}/participants", get(list_participants))
}

/// A chat with its participant ids replaced by user snapshots.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ChatKind,
    pub participants: Vec<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

async fn expand(state: &AppState, chat: Chat) -> Result<ChatResponse, ApiError> {
    let participants = state.store.users_by_ids(&chat.participants).await?;
    Ok(ChatResponse {
        id: chat.id,
        name: chat.name,
        type_: chat.type_,
        participants,
        last_message: chat.last_message,
        unread_count: chat.unread_count,
        created_at: chat.created_at,
        updated_at: chat.updated_at,
        avatar: chat.avatar,
        description: chat.description,
    })
}

// ---------------------------------------------------------------------------
// GET /api/chats
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ListChatsResponse {
    pub chats: Vec<ChatResponse>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "Chats",
    responses(
        (status = 200, description = "Chats the current user participates in", body = ListChatsResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorBody),
    ),
)]
pub async fn list_chats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ListChatsResponse>, ApiError> {
    let chats = state.store.chats_for_user(&auth.user.id).await?;
    let mut expanded = Vec::with_capacity(chats.len());
    for chat in chats {
        expanded.push(expand(&state, chat).await?);
    }
    let total = expanded.len();
    Ok(Json(ListChatsResponse {
        chats: expanded,
        total,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/chats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub name: String,
    #[serde(rename = "type", default = "default_chat_kind")]
    pub type_: ChatKind,
    #[serde(default)]
    pub participants: Vec<String>,
    pub description: Option<String>,
}

fn default_chat_kind() -> ChatKind {
    ChatKind::Group
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatEnvelope {
    pub chat: ChatResponse,
}

#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "Chats",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatEnvelope),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 401, description = "Not authenticated", body = ApiErrorBody),
    ),
)]
pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatEnvelope>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Chat name is required"));
    }

    // The creator is always a participant; unknown ids are dropped.
    let mut participant_ids = body.participants;
    if !participant_ids.contains(&auth.user.id) {
        participant_ids.push(auth.user.id.clone());
    }
    let valid: Vec<String> = state
        .store
        .users_by_ids(&participant_ids)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();
    if valid.is_empty() {
        return Err(ApiError::bad_request("No valid participants found"));
    }

    let now = Utc::now();
    let chat = Chat {
        id: prefixed_ulid(prefix::CHAT),
        name: body.name,
        type_: body.type_,
        participants: valid,
        last_message: None,
        unread_count: 0,
        created_at: now,
        updated_at: now,
        avatar: None,
        description: body.description,
    };
    state.store.insert_chat(chat.clone()).await?;

    tracing::info!(chat_id = %chat.id, user_id = %auth.user.id, "chat created");
    Ok((
        StatusCode::CREATED,
        Json(ChatEnvelope {
            chat: expand(&state, chat).await?,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/chats/{id}
// ---------------------------------------------------------------------------

/// Load a chat and verify the caller is a participant.
async fn load_for_participant(
    state: &AppState,
    chat_id: &str,
    user: &User,
) -> Result<Chat, ApiError> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    if !chat.participants.contains(&user.id) {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(chat)
}

#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat detail", body = ChatEnvelope),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn get_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    let chat = load_for_participant(&state, &id, &auth.user).await?;
    Ok(Json(ChatEnvelope {
        chat: expand(&state, chat).await?,
    }))
}

// ---------------------------------------------------------------------------
// PUT /api/chats/{id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateChatRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/chats/{id}",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat id")),
    request_body = UpdateChatRequest,
    responses(
        (status = 200, description = "Chat updated", body = ChatEnvelope),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn update_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateChatRequest>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    let mut chat = load_for_participant(&state, &id, &auth.user).await?;

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("Chat name is required"));
        }
        chat.name = name;
    }
    if let Some(description) = body.description {
        chat.description = Some(description);
    }
    if let Some(avatar) = body.avatar {
        chat.avatar = Some(avatar);
    }
    chat.updated_at = Utc::now();

    state.store.update_chat(chat.clone()).await?;
    Ok(Json(ChatEnvelope {
        chat: expand(&state, chat).await?,
    }))
}

// ---------------------------------------------------------------------------
// DELETE /api/chats/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/chats/{id}",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat deleted"),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn delete_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    load_for_participant(&state, &id, &auth.user).await?;
    state.store.delete_chat(&id).await?;
    tracing::info!(chat_id = %id, user_id = %auth.user.id, "chat deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// GET /api/chats/{id}/participants
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantsResponse {
    pub participants: Vec<User>,
}

#[utoipa::path(
    get,
    path = "/api/chats/{id}/participants",
    tag = "Chats",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat participants", body = ParticipantsResponse),
        (status = 403, description = "Not a participant", body = ApiErrorBody),
        (status = 404, description = "Unknown chat", body = ApiErrorBody),
    ),
)]
pub async fn list_participants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ParticipantsResponse>, ApiError> {
    let chat = load_for_participant(&state, &id, &auth.user).await?;
    let participants = state.store.users_by_ids(&chat.participants).await?;
    Ok(Json(ParticipantsResponse { participants }))
}
