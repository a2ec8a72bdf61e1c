#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_api::config::Config;
use chat_api::db::kv::{KeyValueStore, MemoryStore};
use chat_api::gateway::membership::MembershipIndex;
use chat_api::gateway::registry::ConnectionRegistry;
use chat_api::gateway::typing::TypingTracker;
use chat_api::store::{seed, ChatStore, MemoryChatStore};
use chat_api::AppState;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Every seeded user authenticates with this password.
pub const PASSWORD: &str = "password123";

/// Build an AppState over freshly seeded in-memory stores.
pub async fn test_state() -> AppState {
    let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
    seed::seed(store.as_ref()).await;

    AppState {
        config: Arc::new(Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origin: "*".to_string(),
        }),
        store,
        kv: Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
        registry: Arc::new(ConnectionRegistry::new()),
        membership: Arc::new(MembershipIndex::new()),
        typing: Arc::new(TypingTracker::new()),
    }
}

/// Boot the real router on an ephemeral port. The server runs until the test
/// process exits.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state().await;
    let app = chat_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Login with a cookie-storing client; returns the client plus the CSRF
/// token from the response body.
pub async fn login_client(addr: SocketAddr, email: &str) -> (reqwest::Client, String) {
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("client");

    let resp = client
        .post(format!("http://{addr}/api/auth"))
        .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .expect("login request");
    assert!(resp.status().is_success(), "login failed for {email}");

    let body: serde_json::Value = resp.json().await.expect("login body");
    let csrf = body["csrfToken"].as_str().expect("csrfToken").to_string();
    (client, csrf)
}

/// Login without a cookie store and return the raw `sessionId=<id>` cookie
/// pair for hand-rolled headers (WS upgrades).
pub async fn login_session_cookie(addr: SocketAddr, email: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/auth"))
        .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .expect("login request");
    assert!(resp.status().is_success(), "login failed for {email}");

    resp.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sessionId="))
        .and_then(|v| v.split(';').next())
        .expect("sessionId cookie")
        .to_string()
}

/// Open a WebSocket, optionally with a session cookie.
pub async fn ws_connect(addr: SocketAddr, cookie: Option<&str>) -> WsStream {
    let mut request = format!("ws://{addr}/api/ws")
        .into_client_request()
        .expect("ws request");
    if let Some(cookie) = cookie {
        request
            .headers_mut()
            .insert(http::header::COOKIE, cookie.parse().expect("cookie header"));
    }
    let (stream, _) = connect_async(request).await.expect("ws connect");
    stream
}

/// Open a socket with a fresh session for `email` and consume the
/// `connected` greeting.
pub async fn ws_login(addr: SocketAddr, email: &str) -> WsStream {
    let cookie = login_session_cookie(addr, email).await;
    let mut stream = ws_connect(addr, Some(&cookie)).await;
    let greeting = recv_event(&mut stream).await;
    assert_eq!(greeting["type"], "connected");
    stream
}

pub async fn send_json(stream: &mut WsStream, value: serde_json::Value) {
    stream
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame, parsed. Panics after 5s of silence.
pub async fn recv_event(stream: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("parse event")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Skip events until one of the given type arrives.
pub async fn recv_event_of(stream: &mut WsStream, event_type: &str) -> serde_json::Value {
    loop {
        let event = recv_event(stream).await;
        if event["type"] == event_type {
            return event;
        }
    }
}
