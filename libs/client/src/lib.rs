//! Client library for the Palaver chat service: reconnecting WebSocket
//! transport, event subscriptions, and reactive chat state.

pub mod config;
pub mod error;
pub mod socket;
pub mod stores;
pub mod subscriptions;

pub use config::ClientConfig;
pub use error::ClientError;
pub use socket::{ChatClient, ConnectionStatus};
pub use stores::ChatStores;
pub use subscriptions::{SubscriptionHandle, SubscriptionRegistry};

pub use palaver_common::{model, proto};
