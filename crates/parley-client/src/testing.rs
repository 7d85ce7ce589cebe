//! Scriptable transport for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::protocol::OutboundFrame;
use crate::transport::{Connector, TransportChannel, TransportSignal};

/// Connector whose sockets are driven by the test through [`FakePeer`]s.
pub(crate) struct FakeConnector {
    refuse_all: AtomicBool,
    refuse_next: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<FakePeer>,
}

impl FakeConnector {
    /// Every accepted connection shows up on the returned receiver.
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakePeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            refuse_all: AtomicBool::new(false),
            refuse_next: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            peers: tx,
        });
        (connector, rx)
    }

    pub(crate) fn refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn refuse_next(&self, count: usize) {
        self.refuse_next.store(count, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    fn should_refuse(&self) -> bool {
        if self.refuse_all.load(Ordering::SeqCst) {
            return true;
        }
        self.refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, endpoint: &str) -> Result<TransportChannel, TransportError> {
        self.attempts.lock().push(Instant::now());

        if self.should_refuse() {
            return Err(TransportError::Connection(format!("{endpoint} refused")));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(FakePeer {
            frames: Some(outgoing_rx),
            signals: signal_tx,
        });

        Ok(TransportChannel {
            outgoing: outgoing_tx,
            incoming: signal_rx,
        })
    }
}

/// Server side of one fake socket.
pub(crate) struct FakePeer {
    frames: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
    signals: mpsc::UnboundedSender<TransportSignal>,
}

impl FakePeer {
    /// Push one inbound text frame to the client.
    pub(crate) fn deliver(&self, text: &str) {
        let _ = self.signals.send(TransportSignal::Message(text.to_string()));
    }

    pub(crate) fn error(&self, message: &str) {
        let _ = self.signals.send(TransportSignal::Error(message.to_string()));
    }

    pub(crate) fn undelivered(&self, frames: Vec<OutboundFrame>) {
        let _ = self.signals.send(TransportSignal::Undelivered(frames));
    }

    /// Next frame the client transmitted.
    pub(crate) async fn recv(&mut self) -> Option<OutboundFrame> {
        match self.frames.as_mut() {
            Some(frames) => frames.recv().await,
            None => None,
        }
    }

    /// Stop accepting frames while keeping the socket "open".
    pub(crate) fn drop_outgoing(&mut self) {
        self.frames = None;
    }

    /// Close the socket from the server side.
    pub(crate) fn close(self) {
        let _ = self.signals.send(TransportSignal::Closed);
    }
}
