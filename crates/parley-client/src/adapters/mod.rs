//! Channel adapters.
//!
//! Thin translators between domain calls and the connection manager:
//! outbound calls build an [`OutboundFrame`] and send it once the socket is
//! open; `on_*` methods subscribe to one inbound label and unpack the typed
//! payload for the callback.

mod chats;
mod messages;

pub use chats::ChatService;
pub use messages::MessageService;

use crate::connection::ConnectionManager;
use crate::dispatcher::Subscription;
use crate::error::Result;
use crate::events::ClientEvent;
use crate::protocol::{InboundFrame, OutboundFrame};

/// Wait for an open socket, then hand `frame` to the manager.
async fn send_when_connected(connection: &ConnectionManager, frame: OutboundFrame) -> Result<()> {
    connection.wait_for_connection().await?;
    connection.send(frame);
    Ok(())
}

/// Like [`send_when_connected`], but a connection failure is only logged.
async fn send_or_log(connection: &ConnectionManager, frame: OutboundFrame, action: &str) {
    let frame_type = frame.frame_type().to_string();
    if let Err(e) = send_when_connected(connection, frame).await {
        tracing::warn!(frame_type = %frame_type, error = %e, "Failed to {action}");
    }
}

/// Subscribe to `label` and pass matching frames through `extract`.
fn on_frame<F>(connection: &ConnectionManager, label: &str, extract: F) -> Subscription
where
    F: Fn(&InboundFrame) + Send + Sync + 'static,
{
    connection
        .dispatcher()
        .subscribe(label, move |event: &ClientEvent| {
            if let ClientEvent::Frame(frame) = event {
                extract(frame);
            }
        })
}
