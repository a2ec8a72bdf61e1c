//! Reconnecting WebSocket client.
//!
//! One background task owns the socket. It reconnects with exponential
//! backoff (`reconnect_delay * 2^attempts`) up to `max_reconnect_attempts`,
//! resets the attempt counter on every successful open, and sends a `ping`
//! heartbeat every `heartbeat_interval` while connected. Explicit
//! `disconnect()` stops the task without reconnecting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use palaver_common::proto::{now_ms, ClientMessage, PingPayload, ServerEvent};
use palaver_common::proto::{ChatTarget, HistoryRequest, MarkReadPayload, SendMessagePayload};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::subscriptions::{SubscriptionHandle, SubscriptionRegistry};
use palaver_common::proto::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget exhausted; reconnection is not resumed automatically.
    Failed,
}

enum Command {
    Send(ClientMessage),
    Disconnect,
}

/// Exponential backoff over a fixed attempt budget.
pub(crate) struct Backoff {
    attempts: u32,
    max: u32,
    base: Duration,
}

impl Backoff {
    pub(crate) fn new(max: u32, base: Duration) -> Self {
        Self {
            attempts: 0,
            max,
            base,
        }
    }

    /// Delay before the next retry, or `None` once the budget is spent.
    /// Increments the attempt counter per scheduled retry.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max {
            return None;
        }
        let delay = self.base * 2u32.saturating_pow(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// A successful open restores the full budget.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }
}

pub struct ChatClient {
    command_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    subscriptions: Arc<SubscriptionRegistry>,
    max_reconnect_attempts: u32,
}

impl ChatClient {
    /// Start the connection task. The returned client is usable immediately;
    /// actions fail with [`ClientError::NotConnected`] until the socket is
    /// open.
    pub fn connect(config: ClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let subscriptions = SubscriptionRegistry::new();
        let max_reconnect_attempts = config.max_reconnect_attempts;

        let task_subs = Arc::clone(&subscriptions);
        tokio::spawn(run(config, status_tx, command_rx, task_subs));

        Self {
            command_tx,
            status_rx,
            subscriptions,
            max_reconnect_attempts,
        }
    }

    /// Wait until the socket is open. Returns
    /// [`ClientError::RetriesExhausted`] once the reconnection budget is
    /// spent, or [`ClientError::NotConnected`] if the connection task ended.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut status_rx = self.status_rx.clone();
        loop {
            match *status_rx.borrow_and_update() {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Failed => {
                    return Err(ClientError::RetriesExhausted(self.max_reconnect_attempts))
                }
                ConnectionStatus::Disconnected | ConnectionStatus::Connecting => {}
            }
            if status_rx.changed().await.is_err() {
                return Err(ClientError::NotConnected);
            }
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel mirroring the connection state machine.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscriptions.subscribe(kind, handler)
    }

    /// Stop the connection task. Idempotent; no reconnection follows.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(Command::Disconnect);
    }

    fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::NotConnected);
        }
        self.command_tx
            .send(Command::Send(message))
            .map_err(|_| ClientError::NotConnected)
    }

    // -- actions ------------------------------------------------------------

    pub fn join_chat(&self, chat_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::JoinChat(ChatTarget {
            chat_id: chat_id.into(),
        }))
    }

    pub fn leave_chat(&self, chat_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::LeaveChat(ChatTarget {
            chat_id: chat_id.into(),
        }))
    }

    pub fn send_message(
        &self,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.send(ClientMessage::SendMessage(SendMessagePayload {
            chat_id: chat_id.into(),
            content: content.into(),
        }))
    }

    pub fn start_typing(&self, chat_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::TypingStart(ChatTarget {
            chat_id: chat_id.into(),
        }))
    }

    pub fn stop_typing(&self, chat_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientMessage::TypingStop(ChatTarget {
            chat_id: chat_id.into(),
        }))
    }

    pub fn mark_read(
        &self,
        chat_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.send(ClientMessage::MarkRead(MarkReadPayload {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
        }))
    }

    pub fn get_chat_history(
        &self,
        chat_id: impl Into<String>,
        limit: Option<usize>,
    ) -> Result<(), ClientError> {
        self.send(ClientMessage::GetChatHistory(HistoryRequest {
            chat_id: chat_id.into(),
            limit,
        }))
    }
}

/// Why a live connection ended.
enum CloseReason {
    /// `disconnect()` was called; do not reconnect.
    Explicit,
    /// Transport closed or errored; eligible for reconnection.
    Lost,
}

async fn run(
    config: ClientConfig,
    status_tx: watch::Sender<ConnectionStatus>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    subscriptions: Arc<SubscriptionRegistry>,
) {
    let mut backoff = Backoff::new(config.max_reconnect_attempts, config.reconnect_delay);

    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);

        match connect_async(&config.url).await {
            Ok((stream, _response)) => {
                tracing::debug!(url = %config.url, "websocket open");
                backoff.reset();
                let _ = status_tx.send(ConnectionStatus::Connected);

                let reason = drive(
                    stream,
                    &mut command_rx,
                    &subscriptions,
                    config.heartbeat_interval,
                )
                .await;
                let _ = status_tx.send(ConnectionStatus::Disconnected);

                if matches!(reason, CloseReason::Explicit) {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(url = %config.url, %err, "websocket connect failed");
                let _ = status_tx.send(ConnectionStatus::Disconnected);
            }
        }

        // Drain a pending explicit disconnect before scheduling a retry.
        if let Ok(Command::Disconnect) = command_rx.try_recv() {
            return;
        }

        match backoff.next_delay() {
            Some(delay) => {
                tracing::debug!(?delay, "scheduling reconnect");
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::error!(
                    attempts = config.max_reconnect_attempts,
                    "reconnection budget exhausted"
                );
                let _ = status_tx.send(ConnectionStatus::Failed);
                return;
            }
        }
    }
}

/// Drive one live connection until it closes.
async fn drive(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    subscriptions: &SubscriptionRegistry,
    heartbeat_interval: Duration,
) -> CloseReason {
    let (mut ws_tx, mut ws_rx) = stream.split();

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                match command {
                    Some(Command::Send(message)) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::error!(%err, "outbound serialization failed");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            return CloseReason::Lost;
                        }
                    }
                    Some(Command::Disconnect) => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return CloseReason::Explicit;
                    }
                    // Client handle dropped: treat as explicit disconnect.
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return CloseReason::Explicit;
                    }
                }
            }

            _ = heartbeat.tick() => {
                let ping = ClientMessage::Ping(PingPayload {
                    timestamp: Some(now_ms()),
                });
                let json = match serde_json::to_string(&ping) {
                    Ok(json) => json,
                    Err(_) => continue,
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    return CloseReason::Lost;
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => subscriptions.dispatch(&event),
                            Err(err) => {
                                tracing::warn!(%err, "undecodable server event");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return CloseReason::Lost,
                    Some(Err(err)) => {
                        tracing::debug!(%err, "websocket read error");
                        return CloseReason::Lost;
                    }
                    _ => continue,
                }
            }
        }
    }
}
