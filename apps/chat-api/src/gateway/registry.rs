//! Connection registry: one entry per live WebSocket.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use palaver_common::id::{prefix, prefixed_ulid};
use palaver_common::model::User;
use palaver_common::proto::ServerEvent;

/// Outbound handle for a connection. Events enqueued here are drained by the
/// connection's own task; a closed channel means the task is gone.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// State for a single live connection.
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    /// Snapshot taken at registration; presence payloads carry it.
    pub user: User,
    /// Chats this connection has joined (its own view, not the shared index).
    pub chat_ids: HashSet<String>,
    pub sender: EventSender,
}

/// Registry of all live connections.
///
/// `DashMap` for shard-level concurrency, `parking_lot::Mutex` per entry for
/// non-poisoning, fast locking.
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Mutex<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Create a connection entry. This is the only place a [`Connection`] is
    /// born; the returned id is the handle for everything that follows.
    pub fn register(&self, user: User, sender: EventSender) -> String {
        let connection_id = prefixed_ulid(prefix::CONNECTION);
        let connection = Connection {
            connection_id: connection_id.clone(),
            user_id: user.id.clone(),
            user,
            chat_ids: HashSet::new(),
            sender,
        };
        self.connections
            .insert(connection_id.clone(), Mutex::new(connection));
        connection_id
    }

    /// Remove a connection, returning its final state so the caller can run
    /// membership cleanup. Idempotent: a second call returns `None`.
    pub fn unregister(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .remove(connection_id)
            .map(|(_, entry)| entry.into_inner())
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// The registered user snapshot for a connection.
    pub fn user(&self, connection_id: &str) -> Option<User> {
        let entry = self.connections.get(connection_id)?;
        let conn = entry.lock();
        Some(conn.user.clone())
    }

    /// Add a chat to the connection's joined set. Returns whether the chat
    /// was newly added (false on a duplicate join from the same connection).
    pub fn add_chat(&self, connection_id: &str, chat_id: &str) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => entry.lock().chat_ids.insert(chat_id.to_string()),
            None => false,
        }
    }

    /// Remove a chat from the connection's joined set. Returns whether the
    /// connection had actually joined it.
    pub fn remove_chat(&self, connection_id: &str, chat_id: &str) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => entry.lock().chat_ids.remove(chat_id),
            None => false,
        }
    }

    pub fn has_chat(&self, connection_id: &str, chat_id: &str) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => entry.lock().chat_ids.contains(chat_id),
            None => false,
        }
    }

    /// Enqueue an event for one connection. Returns false if the connection
    /// is unknown or its outbound channel is closed (transport gone).
    pub fn send(&self, connection_id: &str, event: ServerEvent) -> bool {
        match self.connections.get(connection_id) {
            Some(entry) => entry.lock().sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Snapshot of (connection_id, user_id) for every live connection, for
    /// fan-out iteration.
    pub fn iter_connections(&self) -> Vec<(String, String)> {
        self.connections
            .iter()
            .map(|entry| {
                let conn = entry.value().lock();
                (conn.connection_id.clone(), conn.user_id.clone())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
