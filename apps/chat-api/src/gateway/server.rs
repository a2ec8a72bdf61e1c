//! WebSocket upgrade handler and per-connection event loop.
//!
//! Authentication happens at upgrade time from the `sessionId` cookie. The
//! upgrade itself always completes; an unauthenticated socket is closed
//! immediately with policy-violation code 1008 so browser clients observe a
//! close event rather than a failed handshake.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use palaver_common::model::User;
use palaver_common::proto::{
    decode_client_message, now_ms, ConnectedPayload, DecodeError, ServerEvent,
};

use crate::auth::sessions::{self, SESSION_COOKIE};
use crate::AppState;

use super::handler;

/// Policy-violation close code sent to unauthenticated sockets.
const CLOSE_UNAUTHORIZED: u16 = 1008;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // Resolve the session before upgrading so the socket task starts with a
    // settled identity.
    let user = authenticate(&state, &headers).await;
    ws.on_upgrade(move |socket| handle_connection(socket, state, user))
}

/// Resolve the `sessionId` cookie to a user, or `None` if anything along the
/// chain is missing or stale.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let cookie_header = headers.get(COOKIE).and_then(|v| v.to_str().ok());
    let cookies = sessions::parse_cookies(cookie_header);
    let session_id = cookies.get(SESSION_COOKIE)?;

    let data = sessions::lookup_session(state.kv.as_ref(), session_id)
        .await
        .ok()??;
    state.store.get_user(&data.user_id).await.ok()?
}

async fn handle_connection(socket: WebSocket, state: AppState, user: Option<User>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(user) = user else {
        let close = Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "Unauthorized".into(),
        }));
        let _ = ws_tx.send(close).await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection_id = state.registry.register(user.clone(), tx);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        "websocket connected"
    );

    let greeting = ServerEvent::Connected(ConnectedPayload {
        user,
        timestamp: now_ms(),
    });
    if send_event(&mut ws_tx, &greeting).await.is_err() {
        handler::disconnect(&state, &connection_id);
        return;
    }

    loop {
        tokio::select! {
            // Outbound: events enqueued for this connection by any handler.
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    // Sender dropped: we were unregistered elsewhere.
                    None => break,
                }
            }

            // Inbound: frames from the client.
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode_client_message(text.as_str()) {
                            Ok(message) => {
                                handler::handle_message(&state, &connection_id, message).await;
                            }
                            Err(DecodeError::UnknownType(t)) => {
                                handler::send_error(
                                    &state,
                                    &connection_id,
                                    format!("Unknown message type: {t}"),
                                );
                            }
                            Err(DecodeError::Invalid) => {
                                handler::send_error(
                                    &state,
                                    &connection_id,
                                    "Invalid message format",
                                );
                            }
                        }
                        // An error handler may have reaped this connection.
                        if !state.registry.contains(&connection_id) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(?err, connection_id = %connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    handler::disconnect(&state, &connection_id);
}

async fn send_event(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}
