//! Events published through the dispatcher.

use parley_core::ConnectionState;

use crate::protocol::{labels, InboundFrame};

/// Payload carried by every dispatch.
///
/// Server frames arrive as [`ClientEvent::Frame`]; the other two variants are
/// produced locally by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A decoded inbound frame.
    Frame(InboundFrame),
    /// The connection status changed.
    Connection(ConnectionState),
    /// The transport reported an error. Reconnection is driven by the close
    /// that follows, not by this event.
    TransportError(String),
}

impl ClientEvent {
    /// Label this event is published under.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Frame(frame) => frame.label(),
            Self::Connection(_) => labels::CONNECTION,
            Self::TransportError(_) => labels::TRANSPORT_ERROR,
        }
    }
}
