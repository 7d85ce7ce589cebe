//! Connection manager.
//!
//! Owns at most one transport channel and drives it through a small state
//! machine:
//!
//! ```text
//!   idle ──connect()──► connecting ──open──► open
//!    ▲                    │   ▲               │
//!    │                    │   │ timer         │ close / socket error
//!  shutdown()          fail   │               ▼
//!    │                    └─► closed ◄────────┘
//!    └─────────────────────────┘
//! ```
//!
//! On every close the manager either schedules a reconnect with exponential
//! backoff or, once `max_retries` consecutive retries have failed, publishes
//! `failed` and stops retrying on its own. A later [`ConnectionManager::send`]
//! or [`ConnectionManager::connect`] starts over.
//!
//! Frames submitted while the socket is not open are kept in a FIFO pending
//! queue and drained, in order, as soon as a socket opens. Frames are never
//! dropped: a frame the channel refuses goes back into the queue.
//!
//! All state lives behind one lock that is never held across an await or
//! while publishing.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use parley_core::ConnectionState;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::dispatcher::EventDispatcher;
use crate::error::{ClientError, Result};
use crate::events::ClientEvent;
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::transport::{Connector, TransportChannel, TransportSignal};

/// Internal lifecycle phase of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No socket and nothing scheduled.
    Idle,
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Open,
    /// The socket closed. A reconnect may be scheduled.
    Closed,
}

struct ManagerState {
    phase: Phase,
    status: ConnectionState,
    retry_count: u32,
    current_delay: Duration,
    pending: VecDeque<OutboundFrame>,
    outgoing: Option<mpsc::UnboundedSender<OutboundFrame>>,
    /// Bumped by every connect attempt and by shutdown. Callbacks from an
    /// older attempt compare against it and bail out.
    generation: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    io_task: Option<JoinHandle<()>>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

struct Inner {
    endpoint: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher<ClientEvent>,
    state: Mutex<ManagerState>,
}

/// What a close leads to.
enum AfterClose {
    Retry { attempt: u32, delay: Duration },
    Failed {
        retries: u32,
        waiters: Vec<oneshot::Sender<Result<()>>>,
    },
}

/// Shared handle to the connection manager.
///
/// Cheap to clone. Must be driven from within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("phase", &state.phase)
            .field("status", &state.status)
            .field("retry_count", &state.retry_count)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create an idle manager. No socket is opened until the first
    /// `connect`, `send` or `wait_for_connection`.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher<ClientEvent>,
    ) -> Self {
        let policy = config.reconnect;
        Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint.clone(),
                policy,
                connector,
                dispatcher,
                state: Mutex::new(ManagerState {
                    phase: Phase::Idle,
                    status: ConnectionState::Disconnected,
                    retry_count: 0,
                    current_delay: policy.base_delay(),
                    pending: VecDeque::new(),
                    outgoing: None,
                    generation: 0,
                    reconnect_timer: None,
                    io_task: None,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Open a socket unless one is already open or opening.
    pub fn connect(&self) {
        let generation = {
            let mut state = self.inner.state.lock();
            if matches!(state.phase, Phase::Connecting | Phase::Open) {
                return;
            }
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            state.phase = Phase::Connecting;
            state.status = ConnectionState::Connecting;
            state.generation += 1;
            state.generation
        };

        tracing::info!(endpoint = %self.inner.endpoint, generation = generation, "Connecting");
        self.publish(&ClientEvent::Connection(ConnectionState::Connecting));

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run_connection(generation).await });

        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.io_task = Some(handle);
        }
    }

    /// Transmit `frame` now if the socket is open, otherwise queue it and
    /// make sure a connection attempt is under way.
    pub fn send(&self, frame: OutboundFrame) {
        let needs_connect = {
            let mut state = self.inner.state.lock();
            let frame = match (state.phase, state.outgoing.as_ref()) {
                (Phase::Open, Some(outgoing)) => match outgoing.send(frame) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(frame)) => frame,
                },
                _ => frame,
            };
            tracing::debug!(
                frame_type = %frame.frame_type(),
                queued = state.pending.len() + 1,
                "Queueing frame until connected"
            );
            state.pending.push_back(frame);
            !matches!(state.phase, Phase::Connecting | Phase::Open)
        };

        if needs_connect {
            self.connect();
        }
    }

    /// Resolve once the socket is open.
    ///
    /// Starts a connection attempt if none is in progress. Every concurrent
    /// waiter is settled by the same transition.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ConnectionFailed` when automatic retries are
    /// exhausted, or `ClientError::Shutdown` if the manager shuts down first.
    pub async fn wait_for_connection(&self) -> Result<()> {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Open {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        self.connect();

        rx.await.unwrap_or(Err(ClientError::Shutdown))
    }

    /// Close the socket and cancel any scheduled reconnect.
    ///
    /// Pending waiters fail with `ClientError::Shutdown`; queued frames are
    /// kept and go out on the next connect.
    pub fn shutdown(&self) {
        let (timer, io_task) = {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Idle;
            state.status = ConnectionState::Disconnected;
            state.generation += 1;
            state.outgoing = None;
            state.waiters.clear();
            (state.reconnect_timer.take(), state.io_task.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(io_task) = io_task {
            io_task.abort();
        }

        tracing::info!(endpoint = %self.inner.endpoint, "Connection manager shut down");
        self.publish(&ClientEvent::Connection(ConnectionState::Disconnected));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current externally observed status.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.state.lock().status
    }

    /// Current internal phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Frames waiting for a socket.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Consecutive retries since the last successful open.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.state.lock().retry_count
    }

    /// Delay used for the most recent reconnect, or the base delay after an open.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.inner.state.lock().current_delay
    }

    /// Endpoint this manager connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Dispatcher events are published on.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher<ClientEvent> {
        &self.inner.dispatcher
    }

    // =========================================================================
    // Socket lifecycle
    // =========================================================================

    async fn run_connection(self, generation: u64) {
        let channel = match self.inner.connector.connect(&self.inner.endpoint).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(endpoint = %self.inner.endpoint, error = %e, "Connection attempt failed");
                self.publish(&ClientEvent::TransportError(e.to_string()));
                self.handle_close(generation);
                return;
            }
        };

        let TransportChannel {
            outgoing,
            mut incoming,
        } = channel;

        if !self.handle_open(generation, outgoing) {
            return;
        }

        // Runs until the transport has released the socket, so frames the
        // writer hands back after a close are still re-queued.
        while let Some(signal) = incoming.recv().await {
            match signal {
                TransportSignal::Message(text) => {
                    let event = ClientEvent::Frame(InboundFrame::decode(&text));
                    self.publish(&event);
                }
                TransportSignal::Error(message) => {
                    tracing::warn!(error = %message, "Transport error");
                    self.publish(&ClientEvent::TransportError(message));
                }
                TransportSignal::Undelivered(frames) => self.requeue_front(generation, frames),
                TransportSignal::Closed => self.detach(generation),
            }
        }

        self.handle_close(generation);
    }

    /// Returns false if the attempt is stale, which drops `outgoing`.
    fn handle_open(&self, generation: u64, outgoing: mpsc::UnboundedSender<OutboundFrame>) -> bool {
        let (drained, waiters) = {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.phase != Phase::Connecting {
                return false;
            }

            state.phase = Phase::Open;
            state.status = ConnectionState::Connected;
            state.retry_count = 0;
            state.current_delay = self.inner.policy.base_delay();

            let mut drained = 0usize;
            while let Some(frame) = state.pending.pop_front() {
                if let Err(mpsc::error::SendError(frame)) = outgoing.send(frame) {
                    state.pending.push_front(frame);
                    break;
                }
                drained += 1;
            }

            state.outgoing = Some(outgoing);
            (drained, std::mem::take(&mut state.waiters))
        };

        tracing::info!(
            endpoint = %self.inner.endpoint,
            drained = drained,
            waiters = waiters.len(),
            "Connected"
        );

        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        self.publish(&ClientEvent::Connection(ConnectionState::Connected));
        true
    }

    fn handle_close(&self, generation: u64) {
        let after = {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.phase == Phase::Idle {
                return;
            }

            state.phase = Phase::Closed;
            state.status = ConnectionState::Disconnected;
            state.outgoing = None;
            state.io_task = None;

            if state.retry_count < self.inner.policy.max_retries {
                state.retry_count += 1;
                let attempt = state.retry_count;
                let delay = self.inner.policy.delay_for(attempt);
                state.current_delay = delay;

                let manager = self.clone();
                state.reconnect_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.fire_reconnect(generation);
                }));

                AfterClose::Retry { attempt, delay }
            } else {
                state.status = ConnectionState::Failed;
                AfterClose::Failed {
                    retries: state.retry_count,
                    waiters: std::mem::take(&mut state.waiters),
                }
            }
        };

        self.publish(&ClientEvent::Connection(ConnectionState::Disconnected));

        match after {
            AfterClose::Retry { attempt, delay } => {
                tracing::info!(
                    attempt = attempt,
                    max_retries = self.inner.policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
            }
            AfterClose::Failed { retries, waiters } => {
                tracing::error!(
                    endpoint = %self.inner.endpoint,
                    retries = retries,
                    "Giving up on reconnecting"
                );
                for waiter in waiters {
                    let _ = waiter.send(Err(ClientError::ConnectionFailed { retries }));
                }
                self.publish(&ClientEvent::Connection(ConnectionState::Failed));
            }
        }
    }

    fn fire_reconnect(&self, generation: u64) {
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation || state.phase != Phase::Closed {
                return;
            }
            // Our own handle: release it without aborting ourselves.
            state.reconnect_timer = None;
        }
        self.connect();
    }

    /// Stop accepting frames for a socket that reported `Closed`.
    fn detach(&self, generation: u64) {
        let mut state = self.inner.state.lock();
        if state.generation == generation {
            state.outgoing = None;
        }
    }

    fn requeue_front(&self, generation: u64, frames: Vec<OutboundFrame>) {
        let mut state = self.inner.state.lock();
        // Kept even for a stale socket; they go out on the next connect.
        tracing::debug!(
            count = frames.len(),
            stale = state.generation != generation,
            "Re-queueing undelivered frames"
        );
        for frame in frames.into_iter().rev() {
            state.pending.push_front(frame);
        }
    }

    fn publish(&self, event: &ClientEvent) {
        self.inner.dispatcher.publish(event.label(), event);
    }
}

// =============================================================================
// Tests
// =============================================================================
