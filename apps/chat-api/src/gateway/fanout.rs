//! Best-effort event delivery to one connection, a chat, or everyone.
//!
//! Delivery is a synchronous enqueue onto each target connection's outbound
//! channel; the connection task drains it onto the socket. A closed channel
//! means the peer is gone — the failed connection ids are returned so the
//! caller can run the disconnect path ([`super::handler::disconnect`]).

use palaver_common::proto::ServerEvent;

use super::membership::MembershipIndex;
use super::registry::ConnectionRegistry;

/// Deliver to a single connection. Returns false on failure (unknown id or
/// dead channel); the caller decides whether to reap.
pub fn to_connection(
    registry: &ConnectionRegistry,
    connection_id: &str,
    event: &ServerEvent,
) -> bool {
    registry.send(connection_id, event.clone())
}

/// Deliver to every connection whose user is an active member of the chat
/// and not excluded. Iterates connections, not members: a member with no
/// live connection silently receives nothing. Returns connection ids whose
/// delivery failed.
pub fn to_chat(
    registry: &ConnectionRegistry,
    membership: &MembershipIndex,
    chat_id: &str,
    event: &ServerEvent,
    exclude_user_ids: &[String],
) -> Vec<String> {
    let members = membership.members_of(chat_id);
    if members.is_empty() {
        return Vec::new();
    }

    let mut failed = Vec::new();
    for (connection_id, user_id) in registry.iter_connections() {
        if !members.contains(&user_id) || exclude_user_ids.contains(&user_id) {
            continue;
        }
        if !registry.send(&connection_id, event.clone()) {
            failed.push(connection_id);
        }
    }
    failed
}

/// Deliver to every live connection, minus exclusions. Returns connection
/// ids whose delivery failed.
pub fn to_all(
    registry: &ConnectionRegistry,
    event: &ServerEvent,
    exclude_user_ids: &[String],
) -> Vec<String> {
    let mut failed = Vec::new();
    for (connection_id, user_id) in registry.iter_connections() {
        if exclude_user_ids.contains(&user_id) {
            continue;
        }
        if !registry.send(&connection_id, event.clone()) {
            failed.push(connection_id);
        }
    }
    failed
}
