//! Streaming message assembler.
//!
//! Turns inbound reply fragments into the ordered [`MessageTimeline`] the
//! front-end renders. Two inputs are supported:
//!
//! - **Labelled fragments** (`MESSAGE` frames) carry a correlation id; a
//!   fragment extends the trailing assistant entry only when the ids match.
//! - **Bare text tokens** carry none; they extend whatever assistant entry
//!   is trailing, or open a new one after a user entry. `[END]` closes the
//!   turn without adding anything.
//!
//! With pacing enabled, content is buffered and revealed by one background
//! task per selected conversation. Selecting another conversation (or none)
//! aborts that task and bumps a generation counter, so a timer that was
//! already due for the previous conversation applies nothing.
//!
//! Every visible change bumps a revision published on a `watch` channel.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use parley_core::{ChatId, CorrelationId, MessageEntry};

use crate::config::PacingConfig;
use crate::pacing::{Jitter, OsJitter, PacingQueue};
use crate::protocol::{Fragment, END_SENTINEL};
use crate::timeline::MessageTimeline;

struct AssemblerState {
    timeline: MessageTimeline,
    queue: PacingQueue,
    active_chat: Option<ChatId>,
    generation: u64,
    pacer: Option<JoinHandle<()>>,
    jitter: Box<dyn Jitter>,
}

struct Shared {
    config: PacingConfig,
    state: Mutex<AssemblerState>,
    revision: watch::Sender<u64>,
}

/// Shared handle to the assembler. Cheap to clone.
#[derive(Clone)]
pub struct StreamingAssembler {
    inner: Arc<Shared>,
}

impl fmt::Debug for StreamingAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StreamingAssembler")
            .field("active_chat", &state.active_chat)
            .field("entries", &state.timeline.len())
            .field("buffered", &state.queue.buffered_chars())
            .field("pacing", &self.inner.config.enabled)
            .finish_non_exhaustive()
    }
}

impl StreamingAssembler {
    /// Create an assembler using OS randomness for pacing.
    #[must_use]
    pub fn new(config: PacingConfig) -> Self {
        Self::with_jitter(config, OsJitter)
    }

    /// Create an assembler with a custom randomness source.
    #[must_use]
    pub fn with_jitter(config: PacingConfig, jitter: impl Jitter + 'static) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Shared {
                config,
                state: Mutex::new(AssemblerState {
                    timeline: MessageTimeline::new(),
                    queue: PacingQueue::new(),
                    active_chat: None,
                    generation: 0,
                    pacer: None,
                    jitter: Box::new(jitter),
                }),
                revision,
            }),
        }
    }

    // =========================================================================
    // Conversation scope
    // =========================================================================

    /// Switch to `chat` (or to no conversation).
    ///
    /// Clears the timeline and anything still buffered for the previous one.
    pub fn select(&self, chat: Option<ChatId>) {
        {
            let mut state = self.inner.state.lock();
            if let Some(pacer) = state.pacer.take() {
                pacer.abort();
            }
            state.timeline.clear();
            state.queue.clear();
            state.generation += 1;
            tracing::debug!(chat = ?chat, generation = state.generation, "Timeline scope changed");
            state.active_chat = chat;
        }
        self.notify();
    }

    /// Conversation the timeline currently belongs to.
    #[must_use]
    pub fn active_chat(&self) -> Option<ChatId> {
        self.inner.state.lock().active_chat.clone()
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Structured-fragment path.
    pub fn ingest_fragment(&self, fragment: &Fragment) {
        {
            let mut state = self.inner.state.lock();
            state.timeline.set_loading(false);
            if !fragment.is_terminator() && !fragment.content.is_empty() {
                self.deliver(&mut state, &fragment.content, fragment.correlation_id.clone());
            }
        }
        self.notify();
    }

    /// Unlabeled-text path.
    pub fn ingest_text(&self, token: &str) {
        {
            let mut state = self.inner.state.lock();
            if token == END_SENTINEL {
                state.timeline.set_loading(false);
            } else if !token.is_empty() {
                self.deliver(&mut state, token, None);
            }
        }
        self.notify();
    }

    /// Append the local user's message.
    pub fn push_user(&self, content: &str) {
        self.inner.state.lock().timeline.push_user(content);
        self.notify();
    }

    /// Replace the timeline with a fetched history.
    ///
    /// Buffered reply text is kept and keeps pacing onto the new entries.
    pub fn replace_history(&self, entries: Vec<MessageEntry>) {
        self.inner.state.lock().timeline.replace(entries);
        self.notify();
    }

    /// Set or clear the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.inner.state.lock().timeline.set_loading(loading);
        self.notify();
    }

    /// Abort pacing without touching the timeline.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.queue.clear();
        if let Some(pacer) = state.pacer.take() {
            pacer.abort();
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Copy of the visible timeline.
    #[must_use]
    pub fn snapshot(&self) -> MessageTimeline {
        self.inner.state.lock().timeline.clone()
    }

    /// Whether a reply is expected.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().timeline.is_loading()
    }

    /// Whether suggestions should be offered.
    #[must_use]
    pub fn show_suggestions(&self) -> bool {
        self.inner.state.lock().timeline.show_suggestions()
    }

    /// Characters buffered for pacing.
    #[must_use]
    pub fn buffered_chars(&self) -> usize {
        self.inner.state.lock().queue.buffered_chars()
    }

    /// Receiver that changes whenever the timeline does.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub(crate) fn notify(&self) {
        self.inner.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    // =========================================================================
    // Pacing
    // =========================================================================

    fn deliver(&self, state: &mut AssemblerState, content: &str, id: Option<CorrelationId>) {
        if !self.inner.config.enabled {
            state.timeline.apply(content, id.as_ref());
            return;
        }

        state.queue.push(content, id);
        if state.pacer.is_none() {
            let assembler = self.clone();
            let generation = state.generation;
            state.pacer = Some(tokio::spawn(async move {
                assembler.run_pacer(generation).await;
            }));
        }
    }

    async fn run_pacer(self, generation: u64) {
        loop {
            let chunk = {
                let mut guard = self.inner.state.lock();
                let state = &mut *guard;
                if state.generation != generation {
                    return;
                }
                let last = state.timeline.last_visible_char();
                match state
                    .queue
                    .next_chunk(last, &self.inner.config, state.jitter.as_mut())
                {
                    Some(chunk) => chunk,
                    None => {
                        state.pacer = None;
                        return;
                    }
                }
            };

            tokio::time::sleep(chunk.delay).await;

            {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    tracing::trace!(generation = generation, "Discarding stale paced chunk");
                    return;
                }
                if state.queue.consume(&chunk) {
                    state
                        .timeline
                        .apply(&chunk.text, chunk.correlation_id.as_ref());
                }
            }
            self.notify();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
