//! Transport and streaming core for the parley chat client.
//!
//! This crate keeps one conversation session alive over an unreliable
//! WebSocket and rebuilds an ordered message timeline from streamed
//! fragments:
//!
//! - **Connection manager**: reconnects with exponential backoff, queues
//!   frames while disconnected and drains them in order on open
//! - **Event dispatcher**: label-keyed publish/subscribe with exact
//!   unsubscribe and panic isolation
//! - **Streaming assembler**: coalesces fragments by correlation id and
//!   optionally paces them out like typing
//! - **Channel adapters**: `ChatService` and `MessageService`
//! - **`ChatClient`**: wires everything together for a front-end
//!
//! # Example
//!
//! ```no_run
//! use parley_client::{ChatClient, ClientConfig};
//!
//! # async fn run() -> parley_client::Result<()> {
//! let client = ChatClient::connect_ws(&ClientConfig::with_endpoint("ws://localhost:8090"));
//! client.start();
//!
//! let mut changes = client.changes();
//! while changes.changed().await.is_ok() {
//!     let snapshot = client.snapshot();
//!     println!("{} chats, {} messages", snapshot.directory.chats.len(), snapshot.timeline.len());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapters;
pub mod assembler;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod pacing;
pub mod protocol;
pub mod timeline;
pub mod transport;

#[cfg(test)]
mod testing;

pub use adapters::{ChatService, MessageService};
pub use assembler::StreamingAssembler;
pub use client::{ChatClient, ChatDirectory, ClientSnapshot};
pub use config::{ClientConfig, PacingConfig, ReconnectPolicy};
pub use connection::{ConnectionManager, Phase};
pub use dispatcher::{EventDispatcher, Subscription};
pub use error::{ClientError, Result, TransportError};
pub use events::ClientEvent;
pub use protocol::{Fragment, InboundFrame, OutboundFrame, END_SENTINEL};
pub use timeline::MessageTimeline;
pub use transport::{Connector, TransportChannel, TransportSignal, WsConnector};

pub use parley_core::{ChatId, ChatSummary, ConnectionState, CorrelationId, MessageEntry, Role};
