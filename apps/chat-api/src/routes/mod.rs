pub mod auth;
pub mod chats;
pub mod health;
pub mod messages;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api",
            auth::router()
                .merge(chats::router())
                .merge(messages::router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::login,
        auth::register,
        auth::logout,
        auth::me,
        // Chats
        chats::list_chats,
        chats::create_chat,
        chats::get_chat,
        chats::update_chat,
        chats::delete_chat,
        chats::list_participants,
        // Messages
        messages::list_messages,
        messages::send_message,
        messages::edit_message,
        messages::delete_message,
        messages::mark_message_read,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            // Models
            palaver_common::model::User,
            palaver_common::model::Chat,
            palaver_common::model::Message,
            palaver_common::model::Reaction,
            palaver_common::model::Attachment,
            // Route request/response types
            health::HealthResponse,
            auth::LoginRequest,
            auth::RegisterRequest,
            auth::AuthResponse,
            auth::MeResponse,
            auth::MeUser,
            chats::CreateChatRequest,
            chats::UpdateChatRequest,
            chats::ChatResponse,
            chats::ChatEnvelope,
            chats::ListChatsResponse,
            chats::ParticipantsResponse,
            messages::SendMessageRequest,
            messages::EditMessageRequest,
            messages::MessageWithSender,
            messages::MessageEnvelope,
            messages::ListMessagesResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Session authentication"),
        (name = "Chats", description = "Chat management"),
        (name = "Messages", description = "Message history and sending"),
    )
)]
pub struct ApiDoc;
