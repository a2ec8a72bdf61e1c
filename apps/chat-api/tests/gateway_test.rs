mod common;

use futures_util::StreamExt;
use std::time::Duration;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use common::{recv_event, recv_event_of, send_json, start_server, ws_connect, ws_login};

// ---------------------------------------------------------------------------
// Upgrade & auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upgrade_without_session_closes_1008() {
    let (addr, _state) = start_server().await;

    let mut stream = ws_connect(addr, None).await;
    let frame = time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("ws read");

    match frame {
        Message::Close(Some(close)) => {
            assert_eq!(u16::from(close.code), 1008);
            assert_eq!(close.reason.as_str(), "Unauthorized");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn upgrade_with_bogus_session_closes_1008() {
    let (addr, _state) = start_server().await;

    let mut stream = ws_connect(addr, Some("sessionId=sess_nonsense")).await;
    let frame = time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("ws read");

    assert!(matches!(frame, Message::Close(Some(close)) if u16::from(close.code) == 1008));
}

#[tokio::test]
async fn authenticated_upgrade_greets_with_connected() {
    let (addr, _state) = start_server().await;

    let cookie = common::login_session_cookie(addr, "alice@example.com").await;
    let mut stream = ws_connect(addr, Some(&cookie)).await;

    let greeting = recv_event(&mut stream).await;
    assert_eq!(greeting["type"], "connected");
    assert_eq!(greeting["data"]["user"]["id"], "1");
    assert!(greeting["data"]["timestamp"].as_i64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Join / leave
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_chat_replies_with_snapshot() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;

    let joined = recv_event_of(&mut alice, "chat_joined").await;
    assert_eq!(joined["data"]["chatId"], "1");
    assert_eq!(joined["data"]["chat"]["id"], "1");
    assert_eq!(joined["data"]["chat"]["type"], "direct");
}

#[tokio::test]
async fn join_unknown_chat_is_an_error() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "nope" } }),
    )
    .await;

    let err = recv_event_of(&mut alice, "error").await;
    assert_eq!(err["data"]["message"], "Chat not found");
}

#[tokio::test]
async fn join_as_non_participant_is_denied() {
    let (addr, _state) = start_server().await;
    // Chat "1" is the alice/maria direct chat; dmitry is not on it.
    let mut dmitry = ws_login(addr, "dmitry@example.com").await;

    send_json(
        &mut dmitry,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;

    let err = recv_event_of(&mut dmitry, "error").await;
    assert_eq!(err["data"]["message"], "Access denied to this chat");
}

#[tokio::test]
async fn join_broadcasts_presence_to_other_members() {
    let (addr, _state) = start_server().await;

    let mut maria = ws_login(addr, "maria@example.com").await;
    send_json(
        &mut maria,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut maria, "chat_joined").await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    send_json(
        &mut alice,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut alice, "chat_joined").await;

    let joined = recv_event_of(&mut maria, "user_joined").await;
    assert_eq!(joined["data"]["chatId"], "1");
    assert_eq!(joined["data"]["user"]["id"], "1");
}

#[tokio::test]
async fn leave_chat_notifies_remaining_members() {
    let (addr, _state) = start_server().await;

    let mut maria = ws_login(addr, "maria@example.com").await;
    send_json(
        &mut maria,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut maria, "chat_joined").await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    send_json(
        &mut alice,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut alice, "chat_joined").await;

    send_json(
        &mut alice,
        serde_json::json!({ "type": "leave_chat", "data": { "chatId": "1" } }),
    )
    .await;
    let left = recv_event_of(&mut alice, "chat_left").await;
    assert_eq!(left["data"]["chatId"], "1");

    let gone = recv_event_of(&mut maria, "user_left").await;
    assert_eq!(gone["data"]["userId"], "1");
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_message_fans_out_and_acks_sender() {
    let (addr, _state) = start_server().await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    let mut maria = ws_login(addr, "maria@example.com").await;
    for stream in [&mut alice, &mut maria] {
        send_json(
            stream,
            serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
        )
        .await;
        recv_event_of(stream, "chat_joined").await;
    }

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "send_message",
            "data": { "chatId": "1", "content": "hi" }
        }),
    )
    .await;

    // Every member, sender included, gets the broadcast copy.
    let to_maria = recv_event_of(&mut maria, "new_message").await;
    assert_eq!(to_maria["data"]["message"]["content"], "hi");
    assert_eq!(to_maria["data"]["message"]["senderId"], "1");

    let to_alice = recv_event_of(&mut alice, "new_message").await;
    let message_id = to_alice["data"]["message"]["id"].as_str().unwrap().to_string();
    assert!(message_id.starts_with("msg_"));

    // The ack carries the same generated id, to the sender only.
    let ack = recv_event_of(&mut alice, "message_sent").await;
    assert_eq!(ack["data"]["messageId"], message_id.as_str());
}

#[tokio::test]
async fn send_without_join_is_rejected_and_not_stored() {
    let (addr, state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "send_message",
            "data": { "chatId": "1", "content": "sneaky" }
        }),
    )
    .await;

    let err = recv_event_of(&mut alice, "error").await;
    assert_eq!(err["data"]["message"], "You are not in this chat");

    // Nothing was appended.
    let page = state.store.recent_messages("1", 50, 0).await.unwrap();
    assert!(page.messages.iter().all(|m| m.content != "sneaky"));
}

#[tokio::test]
async fn chat_history_returns_most_recent_in_order() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    // Chat "1" has 5 seeded messages; no join is required for history.
    send_json(
        &mut alice,
        serde_json::json!({
            "type": "get_chat_history",
            "data": { "chatId": "1", "limit": 2 }
        }),
    )
    .await;

    let history = recv_event_of(&mut alice, "chat_history").await;
    let messages = history["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    // The two newest, oldest-first within the page.
    assert_eq!(messages[0]["id"], "msg1_4");
    assert_eq!(messages[1]["id"], "msg1_5");
}

#[tokio::test]
async fn mark_read_broadcasts_to_whole_chat() {
    let (addr, _state) = start_server().await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    let mut maria = ws_login(addr, "maria@example.com").await;
    for stream in [&mut alice, &mut maria] {
        send_json(
            stream,
            serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
        )
        .await;
        recv_event_of(stream, "chat_joined").await;
    }

    send_json(
        &mut maria,
        serde_json::json!({
            "type": "mark_read",
            "data": { "chatId": "1", "messageId": "msg1_5" }
        }),
    )
    .await;

    // Marker included.
    let seen_by_maria = recv_event_of(&mut maria, "message_read").await;
    assert_eq!(seen_by_maria["data"]["messageId"], "msg1_5");
    assert_eq!(seen_by_maria["data"]["readBy"], "2");

    let seen_by_alice = recv_event_of(&mut alice, "message_read").await;
    assert_eq!(seen_by_alice["data"]["messageId"], "msg1_5");
}

#[tokio::test]
async fn mark_read_unknown_message_is_silent() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "mark_read",
            "data": { "chatId": "1", "messageId": "msg_missing" }
        }),
    )
    .await;

    // A follow-up request delimits the silence: the next event must be the
    // history reply, with no error or message_read in between.
    send_json(
        &mut alice,
        serde_json::json!({
            "type": "get_chat_history",
            "data": { "chatId": "1", "limit": 1 }
        }),
    )
    .await;
    let next = recv_event(&mut alice).await;
    assert_eq!(next["type"], "chat_history");
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn typing_events_reach_other_members_only() {
    let (addr, _state) = start_server().await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    let mut maria = ws_login(addr, "maria@example.com").await;
    for stream in [&mut alice, &mut maria] {
        send_json(
            stream,
            serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
        )
        .await;
        recv_event_of(stream, "chat_joined").await;
    }

    send_json(
        &mut alice,
        serde_json::json!({ "type": "typing_start", "data": { "chatId": "1" } }),
    )
    .await;
    let typing = recv_event_of(&mut maria, "typing_start").await;
    assert_eq!(typing["data"]["userId"], "1");
    assert_eq!(typing["data"]["user"]["name"], "Alice Carter");

    send_json(
        &mut alice,
        serde_json::json!({ "type": "typing_stop", "data": { "chatId": "1" } }),
    )
    .await;
    let stopped = recv_event_of(&mut maria, "typing_stop").await;
    assert_eq!(stopped["data"]["userId"], "1");
}

// ---------------------------------------------------------------------------
// Multi-connection membership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_connection_does_not_reannounce_presence() {
    let (addr, _state) = start_server().await;

    let mut maria = ws_login(addr, "maria@example.com").await;
    send_json(
        &mut maria,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut maria, "chat_joined").await;

    // Two tabs for alice, both joined to chat 1.
    let mut alice_a = ws_login(addr, "alice@example.com").await;
    let mut alice_b = ws_login(addr, "alice@example.com").await;
    for stream in [&mut alice_a, &mut alice_b] {
        send_json(
            stream,
            serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
        )
        .await;
        recv_event_of(stream, "chat_joined").await;
    }

    // One announcement for the first tab.
    recv_event_of(&mut maria, "user_joined").await;

    // Closing one tab must not announce user_offline while the other stays.
    drop(alice_b);

    // A message from the surviving tab delimits the window: maria must see
    // new_message next, with no second user_joined or any user_offline.
    send_json(
        &mut alice_a,
        serde_json::json!({
            "type": "send_message",
            "data": { "chatId": "1", "content": "still here" }
        }),
    )
    .await;
    let next = recv_event(&mut maria).await;
    assert_eq!(next["type"], "new_message");
    assert_eq!(next["data"]["message"]["content"], "still here");
}

#[tokio::test]
async fn closing_last_connection_broadcasts_offline() {
    let (addr, _state) = start_server().await;

    let mut maria = ws_login(addr, "maria@example.com").await;
    send_json(
        &mut maria,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut maria, "chat_joined").await;

    let mut alice = ws_login(addr, "alice@example.com").await;
    send_json(
        &mut alice,
        serde_json::json!({ "type": "join_chat", "data": { "chatId": "1" } }),
    )
    .await;
    recv_event_of(&mut alice, "chat_joined").await;
    recv_event_of(&mut maria, "user_joined").await;

    drop(alice);

    let offline = recv_event_of(&mut maria, "user_offline").await;
    assert_eq!(offline["data"]["chatId"], "1");
    assert_eq!(offline["data"]["userId"], "1");
}

// ---------------------------------------------------------------------------
// Frame handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_type_echoes_name_in_error() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({ "type": "frobnicate", "data": {} }),
    )
    .await;
    let err = recv_event_of(&mut alice, "error").await;
    assert_eq!(err["data"]["message"], "Unknown message type: frobnicate");
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    use futures_util::SinkExt;
    alice
        .send(Message::Text("not json".into()))
        .await
        .expect("send");
    let err = recv_event_of(&mut alice, "error").await;
    assert_eq!(err["data"]["message"], "Invalid message format");

    // Still usable.
    send_json(
        &mut alice,
        serde_json::json!({ "type": "get_chat_history", "data": { "chatId": "1" } }),
    )
    .await;
    let history = recv_event_of(&mut alice, "chat_history").await;
    assert_eq!(history["data"]["chatId"], "1");
}

#[tokio::test]
async fn ping_is_a_silent_keepalive() {
    let (addr, _state) = start_server().await;
    let mut alice = ws_login(addr, "alice@example.com").await;

    send_json(
        &mut alice,
        serde_json::json!({ "type": "ping", "data": { "timestamp": 123 } }),
    )
    .await;

    // No reply to the ping; the next reply belongs to the history request.
    send_json(
        &mut alice,
        serde_json::json!({ "type": "get_chat_history", "data": { "chatId": "1", "limit": 1 } }),
    )
    .await;
    let next = recv_event(&mut alice).await;
    assert_eq!(next["type"], "chat_history");
}
