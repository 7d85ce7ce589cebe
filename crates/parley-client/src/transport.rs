//! Transport socket abstraction.
//!
//! A [`Connector`] opens one duplex text channel and hands back a
//! [`TransportChannel`]: an outgoing frame sender plus a stream of
//! [`TransportSignal`]s. The connection manager owns at most one channel at
//! a time and drops its sender to close it.
//!
//! [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`, using one writer task and one reader task per socket.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::protocol::OutboundFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signals emitted by an open channel.
#[derive(Debug)]
pub enum TransportSignal {
    /// One inbound text frame.
    Message(String),
    /// The socket reported an error. A `Closed` follows if the socket dies.
    Error(String),
    /// Frames accepted by the channel but never written, oldest first.
    Undelivered(Vec<OutboundFrame>),
    /// The socket closed.
    Closed,
}

/// An open duplex channel.
///
/// Dropping `outgoing` asks the transport to close the socket. The
/// `incoming` stream ends once the transport has released every resource.
#[derive(Debug)]
pub struct TransportChannel {
    /// Frames to transmit, in order.
    pub outgoing: mpsc::UnboundedSender<OutboundFrame>,
    /// Signals from the socket.
    pub incoming: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Opens transport channels.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a channel to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be opened.
    async fn connect(&self, endpoint: &str) -> Result<TransportChannel, TransportError>;
}

/// WebSocket connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<TransportChannel, TransportError> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        tracing::debug!(endpoint = %endpoint, "WebSocket opened");

        let (write, read) = ws_stream.split();

        // Channel for outgoing frames
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<OutboundFrame>();

        // Channel for socket signals
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<TransportSignal>();

        // Spawn the writer task
        tokio::spawn(ws_writer(write, outgoing_rx, signal_tx.clone()));

        // Spawn the reader task
        tokio::spawn(ws_reader(read, signal_tx));

        Ok(TransportChannel {
            outgoing: outgoing_tx,
            incoming: signal_rx,
        })
    }
}

/// Task that writes outgoing frames.
///
/// On a write failure the failed frame and everything still buffered are
/// handed back as `Undelivered`. When the sender side is dropped the socket
/// is closed.
async fn ws_writer(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    while let Some(frame) = rx.recv().await {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(frame_type = %frame.frame_type(), error = %e, "Dropping unencodable frame");
                continue;
            }
        };

        if let Err(e) = write.send(Message::Text(text)).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            rx.close();
            let mut undelivered = vec![frame];
            while let Ok(rest) = rx.try_recv() {
                undelivered.push(rest);
            }
            let _ = signals.send(TransportSignal::Undelivered(undelivered));
            return;
        }
    }

    let _ = write.send(Message::Close(None)).await;
}

/// Task that reads inbound frames and forwards them as signals.
async fn ws_reader(
    mut read: SplitStream<WsStream>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if signals.send(TransportSignal::Message(text)).is_err() {
                    return;
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    if signals.send(TransportSignal::Message(text)).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::debug!(error = %e, "Ignoring non UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                tracing::debug!(frame = ?frame, "WebSocket closed by peer");
                break;
            }
            // Control frames are answered by tungstenite
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                let _ = signals.send(TransportSignal::Error(e.to_string()));
                break;
            }
        }
    }

    let _ = signals.send(TransportSignal::Closed);
}
