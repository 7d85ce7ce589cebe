//! Application state.
//!
//! `App` owns the terminal-side state (input buffer, focus, dialogs) and a
//! [`ClientSnapshot`] copied from the [`ChatClient`] whenever it reports a
//! change. Every action that touches chats or messages goes through the
//! client on a spawned task, so the event loop keeps drawing while the
//! socket is down. Submit results come back through [`App::next_submit_outcome`].

use tokio::sync::mpsc;

use parley_client::{
    ChatClient, ChatId, ChatSummary, ClientError, ClientSnapshot, ConnectionState, CorrelationId,
};

/// Prompts offered while the selected chat has no messages.
pub const SUGGESTIONS: &[&str] = &[
    "What can you help me with?",
    "Summarize our last conversation",
    "Give me three ideas for a weekend project",
    "Explain how WebSockets work",
];

/// Banner text for a connection status, or `None` while connected.
#[must_use]
pub const fn banner_text(status: ConnectionState) -> Option<&'static str> {
    match status {
        ConnectionState::Connected => None,
        ConnectionState::Connecting => Some("Connecting to server..."),
        ConnectionState::Disconnected | ConnectionState::Failed => {
            Some("Connection lost. Attempting to reconnect...")
        }
    }
}

/// Which UI column has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Left column: chat list.
    Chats,
    /// Right column: timeline with input.
    #[default]
    Timeline,
}

impl Focus {
    /// Toggle to the other column.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Chats => Self::Timeline,
            Self::Timeline => Self::Chats,
        }
    }
}

/// Input mode for modal dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Regular operation.
    #[default]
    Normal,
    /// Prompting for a new chat name.
    CreatingChat,
    /// Confirming deletion of the highlighted chat.
    ConfirmingDelete,
}

/// Result of a submit that ran in the background.
#[derive(Debug)]
pub struct SubmitOutcome {
    /// Input line the text was taken from, put back on failure.
    draft: Option<String>,
    result: Result<CorrelationId, ClientError>,
}

/// Application state.
pub struct App {
    client: ChatClient,
    /// Last copy of the client's visible state.
    pub view: ClientSnapshot,
    /// Highlighted row in the chat list.
    pub highlighted: Option<usize>,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in the input, in characters.
    pub cursor_position: usize,
    /// Which column has focus.
    pub focus: Focus,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Lines scrolled up from the bottom of the timeline.
    pub chat_scroll: usize,
    /// Highlighted suggestion, if any.
    pub suggestion: Option<usize>,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for the loading spinner.
    pub animation_frame: usize,
    /// Endpoint shown in the header.
    endpoint: String,
    /// Chat input saved while a dialog borrows the input line.
    saved_chat_input: Option<(String, usize)>,
    /// A submit is waiting for the connection.
    submitting: bool,
    outcome_tx: mpsc::UnboundedSender<SubmitOutcome>,
    outcomes: mpsc::UnboundedReceiver<SubmitOutcome>,
}

impl App {
    /// Create a new application on top of `client`.
    #[must_use]
    pub fn new(client: ChatClient) -> Self {
        let view = client.snapshot();
        let endpoint = client.connection().endpoint().to_string();
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        Self {
            client,
            view,
            highlighted: None,
            input: String::new(),
            cursor_position: 0,
            focus: Focus::default(),
            input_mode: InputMode::Normal,
            chat_scroll: 0,
            suggestion: None,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
            endpoint,
            saved_chat_input: None,
            submitting: false,
            outcome_tx,
            outcomes,
        }
    }

    /// Re-read the client's state.
    pub fn refresh(&mut self) {
        let previous = self.view.directory.selected.clone();
        self.view = self.client.snapshot();

        let chats = &self.view.directory.chats;
        self.highlighted = match (&self.view.directory.selected, self.highlighted) {
            // Follow server-side selection changes such as a freshly created chat
            (Some(id), _) if self.view.directory.selected != previous => {
                chats.iter().position(|chat| &chat.id == id)
            }
            (_, Some(_)) if chats.is_empty() => None,
            (_, Some(i)) => Some(i.min(chats.len() - 1)),
            (_, None) => None,
        };

        if !self.show_suggestions() {
            self.suggestion = None;
        }
    }

    /// Tick the animation frame.
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner character.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Endpoint for display.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Banner text for the current connection status.
    #[must_use]
    pub fn banner(&self) -> Option<&'static str> {
        banner_text(self.view.directory.status)
    }

    /// Whether a reply is pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.view.timeline.is_loading()
    }

    /// Whether the suggestion list is shown.
    #[must_use]
    pub fn show_suggestions(&self) -> bool {
        self.view.directory.selected.is_some() && self.view.timeline.show_suggestions()
    }

    /// The chat open in the timeline.
    #[must_use]
    pub fn selected_chat(&self) -> Option<&ChatSummary> {
        self.view.directory.selected_chat()
    }

    /// The chat under the list cursor.
    #[must_use]
    pub fn highlighted_chat(&self) -> Option<&ChatSummary> {
        self.highlighted.and_then(|i| self.view.directory.chats.get(i))
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    // =========================================================================
    // Dialogs
    // =========================================================================

    /// Enter a dialog mode, saving the current chat input.
    pub fn enter_dialog_mode(&mut self, mode: InputMode) {
        self.saved_chat_input = Some((std::mem::take(&mut self.input), self.cursor_position));
        self.cursor_position = 0;
        self.input_mode = mode;
    }

    /// Exit dialog mode, restoring the saved chat input.
    pub fn exit_dialog_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        if let Some((input, cursor)) = self.saved_chat_input.take() {
            self.input = input;
            self.cursor_position = cursor;
        } else {
            self.clear_input();
        }
    }

    // =========================================================================
    // Chat List Navigation
    // =========================================================================

    /// Move the list cursor up, wrapping around.
    pub fn highlight_prev(&mut self) {
        let len = self.view.directory.chats.len();
        if len == 0 {
            return;
        }
        self.highlighted = Some(match self.highlighted {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        });
    }

    /// Move the list cursor down, wrapping around.
    pub fn highlight_next(&mut self) {
        let len = self.view.directory.chats.len();
        if len == 0 {
            return;
        }
        self.highlighted = Some(match self.highlighted {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        });
    }

    /// Open the highlighted chat, or close it if it is already open.
    pub fn open_highlighted(&mut self) {
        let Some(id) = self.highlighted_chat().map(|chat| chat.id.clone()) else {
            return;
        };
        self.client.select(Some(id));
        self.chat_scroll = 0;
        self.refresh();
    }

    // =========================================================================
    // Suggestions
    // =========================================================================

    /// Move the suggestion cursor, wrapping around.
    pub fn cycle_suggestion(&mut self, forward: bool) {
        if !self.show_suggestions() {
            return;
        }
        let len = SUGGESTIONS.len();
        self.suggestion = Some(match (self.suggestion, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        });
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll the timeline up (older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll the timeline down (newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_chars() {
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete back to the previous space.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            let before = self.cursor_position.checked_sub(1).and_then(|i| self.input.chars().nth(i));
            if before == Some(' ') {
                break;
            }
        }
    }

    /// Move the cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move the cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_chars() {
            self.cursor_position += 1;
        }
    }

    /// Move the cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move the cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_chars();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        self.cursor_position = 0;
        std::mem::take(&mut self.input)
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Send the input, or the highlighted suggestion when the input is empty.
    ///
    /// Returns at once. The input line is cleared now and put back if the
    /// send fails.
    pub fn submit(&mut self) {
        if self.submitting {
            self.set_status("Waiting for the reply to finish...");
            return;
        }

        let (text, draft) = match self.suggestion {
            Some(i) if self.input.trim().is_empty() => (SUGGESTIONS[i].to_string(), None),
            _ => {
                let draft = self.take_input();
                (draft.clone(), Some(draft))
            }
        };

        self.submitting = true;
        self.chat_scroll = 0;
        let client = self.client.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = client.submit(&text).await;
            let _ = outcome_tx.send(SubmitOutcome { draft, result });
        });
    }

    /// Wait for the next background submit to finish.
    pub async fn next_submit_outcome(&mut self) -> Option<SubmitOutcome> {
        self.outcomes.recv().await
    }

    /// Apply a finished submit to the UI.
    pub fn apply_submit(&mut self, outcome: SubmitOutcome) {
        self.submitting = false;
        let SubmitOutcome { draft, result } = outcome;

        match result {
            Ok(id) => {
                tracing::debug!(trace_id = %id, "Message submitted");
                self.suggestion = None;
                self.status_message = None;
            }
            Err(e) => {
                if let Some(draft) = draft {
                    if self.input.is_empty() {
                        self.input = draft;
                        self.move_cursor_end();
                    }
                }
                match e {
                    ClientError::EmptyMessage => {}
                    ClientError::Busy => self.set_status("Waiting for the reply to finish..."),
                    ClientError::MissingChatId => self.set_error("Select a chat first"),
                    e => {
                        tracing::warn!(error = %e, "Failed to send message");
                        self.set_error(format!("Failed to send: {e}"));
                    }
                }
            }
        }
        self.refresh();
    }

    /// Whether a submit is still waiting for the connection.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Create a chat named `name`.
    pub fn create_chat(&mut self, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.set_status(format!("Creating chat '{name}'..."));
        let client = self.client.clone();
        tokio::spawn(async move { client.create_chat(&name).await });
    }

    /// Delete the highlighted chat.
    pub fn delete_highlighted(&mut self) {
        let Some(chat) = self.highlighted_chat().cloned() else {
            return;
        };
        self.set_status(format!("Deleting chat '{}'...", chat.name));
        let client = self.client.clone();
        tokio::spawn(async move { client.delete_chat(&chat.id).await });
    }

    /// Whether `id` is the chat open in the timeline.
    #[must_use]
    pub fn is_open(&self, id: &ChatId) -> bool {
        self.view.directory.selected.as_ref() == Some(id)
    }
}

// =============================================================================
// Tests
// =============================================================================
