use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// An action was invoked while the socket was not connected.
    #[error("not connected")]
    NotConnected,

    /// An outbound message could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The reconnection controller exhausted its retry budget.
    #[error("gave up after {0} reconnection attempts")]
    RetriesExhausted(u32),
}
