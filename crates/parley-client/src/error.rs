//! Client error types.

use thiserror::Error;

use parley_core::CoreError;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors reported to callers of the client API.
///
/// Socket-level failures never show up here directly: they drive the
/// reconnect loop and only surface as [`ClientError::ConnectionFailed`] once
/// retries are exhausted.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs a selected chat.
    #[error("chat id is required")]
    MissingChatId,

    /// A reply is still streaming for the current chat.
    #[error("a reply is still in progress")]
    Busy,

    /// Nothing to send.
    #[error("message is empty")]
    EmptyMessage,

    /// Automatic reconnection gave up before the connection opened.
    #[error("connection failed after {retries} retries")]
    ConnectionFailed {
        /// Retries attempted before giving up.
        retries: u32,
    },

    /// The connection manager was shut down while waiting.
    #[error("connection manager shut down")]
    Shutdown,

    /// Domain type error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to connect.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failed to send a frame.
    #[error("Send failed: {0}")]
    Send(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
