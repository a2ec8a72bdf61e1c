pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use db::kv::KeyValueStore;
use gateway::membership::MembershipIndex;
use gateway::registry::ConnectionRegistry;
use gateway::typing::TypingTracker;
use store::ChatStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub membership: Arc<MembershipIndex>,
    pub typing: Arc<TypingTracker>,
}
