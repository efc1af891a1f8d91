use std::sync::Arc;
use tokio_tungstenite::tungstenite;

/// Errors raised by the streaming transports.
///
/// Cloneable so that one close outcome can be handed to every caller waiting
/// on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The socket could not be established.
    #[error("Can't connect to websocket: {0}")]
    Connect(Arc<tungstenite::Error>),
    /// A transport fault after the socket was open.
    #[error("Websocket error: {0}")]
    Runtime(Arc<tungstenite::Error>),
    #[error("Can't close websocket: {0}")]
    Close(Arc<tungstenite::Error>),
    #[error("socket already closed")]
    AlreadyClosed,
    #[error("still receiving messages")]
    StillReceiving,
    #[error("Agent already running")]
    AgentAlreadyRunning,
    #[error("Malformed frame: {0}")]
    Decode(String),
    #[error("Push stream error: {0}")]
    Push(String),
    #[error(transparent)]
    Core(Arc<neuphonic_core::Error>),
}

impl From<neuphonic_core::Error> for Error {
    fn from(err: neuphonic_core::Error) -> Self {
        Self::Core(Arc::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Push(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
