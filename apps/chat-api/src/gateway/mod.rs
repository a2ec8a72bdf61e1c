//! Real-time layer: connection registry, chat membership, typing state, and
//! event fan-out over WebSockets.

pub mod fanout;
pub mod handler;
pub mod membership;
pub mod registry;
pub mod server;
pub mod typing;
