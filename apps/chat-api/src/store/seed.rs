//! Demo fixture data: five users, five chats, and a spread of messages.
//!
//! Every seeded user authenticates with `password123`.

use chrono::{Duration, Utc};

use palaver_common::model::{
    Chat, ChatKind, Message, MessageKind, MessageStatus, User, UserRole, UserStatus,
};

use crate::auth::sessions::password_digest;
use crate::store::ChatStore;

pub const SEED_PASSWORD: &str = "password123";

fn user(
    id: &str,
    name: &str,
    email: &str,
    status: UserStatus,
    role: UserRole,
    created_days_ago: i64,
) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        avatar: None,
        status,
        last_seen: Some(Utc::now()),
        role,
        created_at: Utc::now() - Duration::days(created_days_ago),
    }
}

fn chat(id: &str, name: &str, kind: ChatKind, participants: &[&str]) -> Chat {
    Chat {
        id: id.to_string(),
        name: name.to_string(),
        type_: kind,
        participants: participants.iter().map(|p| p.to_string()).collect(),
        last_message: None,
        unread_count: 0,
        created_at: Utc::now() - Duration::days(30),
        updated_at: Utc::now(),
        avatar: None,
        description: None,
    }
}

fn message(id: &str, chat_id: &str, sender_id: &str, content: &str, minutes_ago: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        content: content.to_string(),
        timestamp: Utc::now() - Duration::minutes(minutes_ago),
        type_: MessageKind::Text,
        status: MessageStatus::Read,
        reactions: vec![],
        reply_to: None,
        attachments: None,
        edited: None,
        edited_at: None,
    }
}

/// Populate a store with the demo dataset.
pub async fn seed(store: &dyn ChatStore) {
    let digest = password_digest(SEED_PASSWORD);

    let users = [
        user("1", "Alice Carter", "alice@example.com", UserStatus::Online, UserRole::User, 120),
        user("2", "Maria Santos", "maria@example.com", UserStatus::Online, UserRole::User, 119),
        user("3", "Dmitry Koslov", "dmitry@example.com", UserStatus::Away, UserRole::User, 118),
        user("4", "Anna Volkova", "anna@example.com", UserStatus::Offline, UserRole::User, 117),
        user("5", "Sergey Morozov", "sergey@example.com", UserStatus::Online, UserRole::Admin, 116),
    ];
    for u in users {
        store
            .insert_user(u, digest.clone())
            .await
            .expect("seed user");
    }

    let chats = [
        chat("1", "Maria Santos", ChatKind::Direct, &["1", "2"]),
        chat("2", "Dmitry Koslov", ChatKind::Direct, &["1", "3"]),
        chat("3", "Dev Team", ChatKind::Group, &["1", "2", "3", "5"]),
        chat("4", "Anna Volkova", ChatKind::Direct, &["1", "4"]),
        chat("5", "General", ChatKind::Channel, &["1", "2", "3", "4", "5"]),
    ];
    for c in chats {
        store.insert_chat(c).await.expect("seed chat");
    }

    let messages = [
        message("msg1_1", "1", "2", "Hi! How are you?", 10),
        message("msg1_2", "1", "1", "Hi! All good, thanks. You?", 8),
        message("msg1_3", "1", "2", "Look what I found!", 7),
        message("msg1_4", "1", "2", "Great, preparing a presentation", 5),
        message("msg1_5", "1", "1", "When is your presentation, by the way?", 4),
        message("msg2_1", "2", "3", "Hey! Got time to discuss the project?", 45),
        message("msg2_2", "2", "1", "Sure! Tomorrow at 15:00 at the office", 30),
        message("msg2_3", "2", "3", "Here is the new interface mockup", 15),
        message("msg3_1", "3", "5", "Hi all! How are the new features coming along?", 180),
        message("msg3_2", "3", "2", "Finished the UI components!", 150),
        message("msg3_3", "3", "3", "Backend API is 80% done", 121),
        message("msg3_4", "3", "5", "New release is ready to deploy!", 120),
        message("msg4_1", "4", "4", "Thanks for the help with the docs!", 24 * 60),
        message("msg5_1", "5", "2", "Good morning everyone!", 240),
        message("msg5_2", "5", "1", "Morning!", 210),
    ];
    for m in messages {
        let chat_id = m.chat_id.clone();
        store.append_message(m.clone()).await.expect("seed message");
        store
            .set_last_message(&chat_id, Some(m))
            .await
            .expect("seed last message");
    }
}
