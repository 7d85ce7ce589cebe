//! Composition root.
//!
//! [`ChatClient`] builds one dispatcher, one connection manager, both channel
//! adapters and the assembler, and wires inbound events into the chat
//! directory and the timeline. Front-ends hold a `ChatClient`, call its
//! methods for user actions and redraw when [`ChatClient::changes`] fires.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use parley_core::{ChatId, ChatSummary, ConnectionState, CorrelationId};

use crate::adapters::{ChatService, MessageService};
use crate::assembler::StreamingAssembler;
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::dispatcher::{EventDispatcher, Subscription};
use crate::error::{ClientError, Result};
use crate::timeline::MessageTimeline;
use crate::transport::{Connector, WsConnector};

/// Chats known to the client and the one being viewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDirectory {
    /// Chats in server order.
    pub chats: Vec<ChatSummary>,
    /// Chat whose timeline is shown.
    pub selected: Option<ChatId>,
    /// Last observed connection status.
    pub status: ConnectionState,
    /// Most recent server-side error.
    pub last_error: Option<String>,
}

impl Default for ChatDirectory {
    fn default() -> Self {
        Self {
            chats: Vec::new(),
            selected: None,
            status: ConnectionState::Disconnected,
            last_error: None,
        }
    }
}

impl ChatDirectory {
    /// Look up a chat by id.
    #[must_use]
    pub fn get(&self, id: &ChatId) -> Option<&ChatSummary> {
        self.chats.iter().find(|chat| &chat.id == id)
    }

    /// The selected chat's summary.
    #[must_use]
    pub fn selected_chat(&self) -> Option<&ChatSummary> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }
}

/// Everything a front-end draws.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Chat list, selection and status.
    pub directory: ChatDirectory,
    /// Visible timeline.
    pub timeline: MessageTimeline,
}

/// Shared handle to a running chat session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatClient {
    connection: ConnectionManager,
    chats: ChatService,
    messages: MessageService,
    assembler: StreamingAssembler,
    directory: Arc<Mutex<ChatDirectory>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl ChatClient {
    /// Build a client over `connector`. Nothing connects until [`ChatClient::start`]
    /// or the first request.
    #[must_use]
    pub fn new(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let dispatcher = EventDispatcher::new();
        let connection = ConnectionManager::new(config, connector, dispatcher);

        let client = Self {
            chats: ChatService::new(connection.clone()),
            messages: MessageService::new(connection.clone()),
            connection,
            assembler: StreamingAssembler::new(config.pacing),
            directory: Arc::new(Mutex::new(ChatDirectory::default())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        };
        client.wire();
        client
    }

    /// Build a client over a WebSocket to `config.endpoint`.
    #[must_use]
    pub fn connect_ws(config: &ClientConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    fn wire(&self) {
        let mut subs = Vec::new();

        let client = self.clone();
        subs.push(self.chats.on_connection_status_change(move |state| {
            client.directory.lock().status = state;
            client.assembler.notify();
            if state == ConnectionState::Connected {
                client.refresh();
            }
        }));

        let client = self.clone();
        subs.push(self.chats.on_chat_list(move |chats| {
            tracing::debug!(count = chats.len(), "Chat list received");
            client.directory.lock().chats = chats.to_vec();
            client.assembler.notify();
        }));

        let client = self.clone();
        subs.push(self.chats.on_new_chat(move |chat| {
            tracing::info!(chat = %chat.id, name = %chat.name, "Chat created");
            client.directory.lock().chats.push(chat.clone());
            client.set_selected(Some(chat.id.clone()));
        }));

        let client = self.clone();
        subs.push(self.chats.on_chat_deleted(move |chat_id| {
            tracing::info!(chat = %chat_id, "Chat deleted");
            let was_selected = {
                let mut directory = client.directory.lock();
                directory.chats.retain(|chat| &chat.id != chat_id);
                directory.selected.as_ref() == Some(chat_id)
            };
            if was_selected {
                client.set_selected(None);
            } else {
                client.assembler.notify();
            }
        }));

        let assembler = self.assembler.clone();
        subs.push(self.messages.on_chat_history(move |entries| {
            assembler.replace_history(entries.to_vec());
        }));

        let assembler = self.assembler.clone();
        subs.push(self.messages.on_first_message(move |content| assembler.push_user(content)));

        let assembler = self.assembler.clone();
        subs.push(self.messages.on_message(move |fragment| assembler.ingest_fragment(fragment)));

        let assembler = self.assembler.clone();
        subs.push(self.messages.on_text_message(move |text| assembler.ingest_text(text)));

        let client = self.clone();
        subs.push(self.messages.on_error(move |error| {
            tracing::warn!(error = %error, "Server reported an error");
            client.directory.lock().last_error = Some(error.to_string());
            client.assembler.set_loading(false);
        }));

        self.subscriptions.lock().extend(subs);
    }

    /// Re-fetch the chat list and the selected chat's history.
    fn refresh(&self) {
        let selected = self.directory.lock().selected.clone();
        let chats = self.chats.clone();
        let messages = self.messages.clone();
        tokio::spawn(async move {
            chats.get_chats().await;
            if let Some(chat_id) = selected {
                let _ = messages.get_chat_history(Some(&chat_id)).await;
            }
        });
    }

    fn set_selected(&self, chat: Option<ChatId>) {
        {
            let mut directory = self.directory.lock();
            directory.selected.clone_from(&chat);
            directory.last_error = None;
        }
        self.assembler.select(chat.clone());

        if let Some(chat_id) = chat {
            let messages = self.messages.clone();
            tokio::spawn(async move {
                let _ = messages.get_chat_history(Some(&chat_id)).await;
            });
        }
    }

    // =========================================================================
    // User actions
    // =========================================================================

    /// Start connecting.
    pub fn start(&self) {
        self.connection.connect();
    }

    /// Select `chat`. Selecting the chat already selected deselects it.
    pub fn select(&self, chat: Option<ChatId>) {
        let current = self.directory.lock().selected.clone();
        let next = match chat {
            Some(id) if current.as_ref() == Some(&id) => None,
            other => other,
        };
        self.set_selected(next);
    }

    /// Ask the server to create a chat. Blank names are ignored.
    pub async fn create_chat(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.chats.create_chat(name).await;
    }

    /// Ask the server to delete a chat.
    pub async fn delete_chat(&self, chat_id: &ChatId) {
        self.chats.delete_chat(chat_id).await;
    }

    /// Send `text` to the selected chat.
    ///
    /// The user entry shows up immediately and the loading flag stays set
    /// until the reply starts.
    ///
    /// # Errors
    ///
    /// - `ClientError::Busy` while a reply is pending
    /// - `ClientError::MissingChatId` with no chat selected
    /// - `ClientError::EmptyMessage` for blank text
    /// - the connection error if the message could not be sent
    pub async fn submit(&self, text: &str) -> Result<CorrelationId> {
        if self.assembler.is_loading() {
            return Err(ClientError::Busy);
        }
        let chat_id = self
            .directory
            .lock()
            .selected
            .clone()
            .ok_or(ClientError::MissingChatId)?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        self.assembler.push_user(text);
        self.assembler.set_loading(true);

        match self.messages.send_message(Some(&chat_id), text).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.assembler.set_loading(false);
                Err(e)
            }
        }
    }

    /// Unsubscribe everything, stop pacing and close the connection.
    pub fn shutdown(&self) {
        self.assembler.stop();
        self.connection.shutdown();
        for sub in self.subscriptions.lock().drain(..) {
            sub.unsubscribe();
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Receiver that changes whenever anything visible does.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.assembler.subscribe()
    }

    /// Copy of everything a front-end draws.
    #[must_use]
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            directory: self.directory.lock().clone(),
            timeline: self.assembler.snapshot(),
        }
    }

    /// Last observed connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.directory.lock().status
    }

    /// Selected chat.
    #[must_use]
    pub fn selected(&self) -> Option<ChatId> {
        self.directory.lock().selected.clone()
    }

    /// Whether a reply is pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.assembler.is_loading()
    }

    /// The connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::protocol::OutboundFrame;
    use crate::testing::{FakeConnector, FakePeer};
    use parley_core::Role;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn config() -> ClientConfig {
        ClientConfig {
            pacing: PacingConfig::disabled(),
            ..ClientConfig::default()
        }
    }

    fn client() -> (ChatClient, Arc<FakeConnector>, UnboundedReceiver<FakePeer>) {
        let (connector, peers) = FakeConnector::new();
        let client = ChatClient::new(&config(), connector.clone());
        (client, connector, peers)
    }

    fn chat(id: &str) -> ChatId {
        ChatId::parse(id).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    /// Start the client and consume the initial `GET_CHATS`.
    async fn started() -> (
        ChatClient,
        Arc<FakeConnector>,
        FakePeer,
        UnboundedReceiver<FakePeer>,
    ) {
        let (client, connector, mut peers) = client();
        client.start();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), OutboundFrame::get_chats());
        peer.deliver(r#"{"type":"CHAT_LIST","chats":[{"id":"c1","name":"One"},{"id":"c2","name":"Two"}]}"#);
        settle().await;
        (client, connector, peer, peers)
    }

    fn contents(client: &ChatClient) -> Vec<String> {
        client
            .snapshot()
            .timeline
            .entries()
            .iter()
            .map(|e| e.content.clone())
            .collect()
    }

    // =========================================================================
    // Directory Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn connect_loads_chat_list() {
        let (client, _connector, _peer, _peers) = started().await;

        let snapshot = client.snapshot();
        assert_eq!(snapshot.directory.status, ConnectionState::Connected);
        assert_eq!(snapshot.directory.chats.len(), 2);
        assert!(snapshot.timeline.show_suggestions());
    }

    #[tokio::test(start_paused = true)]
    async fn select_fetches_history_and_toggles() {
        let (client, _connector, mut peer, _peers) = started().await;

        client.select(Some(chat("c1")));
        assert_eq!(
            peer.recv().await.unwrap(),
            OutboundFrame::get_chat_history(&chat("c1"))
        );
        peer.deliver(
            r#"{"type":"CHAT_HISTORY","messages":[{"content":"q","role":"user"},{"content":"a","role":"assistant","id":"t0"}]}"#,
        );
        settle().await;
        assert_eq!(contents(&client), vec!["q", "a"]);
        assert_eq!(client.snapshot().directory.selected_chat().unwrap().name, "One");

        // Selecting the same chat again deselects
        client.select(Some(chat("c1")));
        assert_eq!(client.selected(), None);
        assert!(contents(&client).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_chat_is_selected() {
        let (client, _connector, mut peer, _peers) = started().await;

        client.create_chat("  Plans ").await;
        assert_eq!(peer.recv().await.unwrap(), OutboundFrame::create_chat("Plans"));

        peer.deliver(r#"{"type":"NEW_CHAT","chat":{"id":"c3","name":"Plans"}}"#);
        settle().await;

        assert_eq!(client.selected(), Some(chat("c3")));
        assert_eq!(client.snapshot().directory.chats.len(), 3);
        assert_eq!(
            peer.recv().await.unwrap(),
            OutboundFrame::get_chat_history(&chat("c3"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_selected_chat_deselects() {
        let (client, _connector, mut peer, _peers) = started().await;
        client.select(Some(chat("c2")));
        let _ = peer.recv().await.unwrap();

        client.delete_chat(&chat("c2")).await;
        assert_eq!(
            peer.recv().await.unwrap(),
            OutboundFrame::delete_chat(&chat("c2"))
        );
        peer.deliver(r#"{"type":"CHAT_DELETED","chatId":"c2"}"#);
        settle().await;

        assert_eq!(client.selected(), None);
        assert_eq!(client.snapshot().directory.chats.len(), 1);
    }

    // =========================================================================
    // Submit Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn submit_without_chat_is_rejected() {
        let (client, connector, _peers) = client();

        let result = client.submit("hello").await;
        assert!(matches!(result, Err(ClientError::MissingChatId)));
        assert_eq!(connector.attempts(), 0);
        assert!(contents(&client).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_submit_is_rejected() {
        let (client, _connector, mut peer, _peers) = started().await;
        client.select(Some(chat("c1")));
        let _ = peer.recv().await.unwrap();

        assert!(matches!(client.submit("   ").await, Err(ClientError::EmptyMessage)));
        assert!(!client.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_then_streamed_reply() {
        let (client, _connector, mut peer, _peers) = started().await;
        client.select(Some(chat("c1")));
        let _ = peer.recv().await.unwrap();

        let id = client.submit("Hi?").await.unwrap();
        assert!(client.is_loading());
        assert_eq!(
            peer.recv().await.unwrap(),
            OutboundFrame::send_message(&chat("c1"), "Hi?", &id)
        );

        // Busy until the reply starts
        assert!(matches!(client.submit("again").await, Err(ClientError::Busy)));

        for frame in [
            format!(r#"{{"type":"MESSAGE","content":"Hel","traceId":"{id}","end":false}}"#),
            format!(r#"{{"type":"MESSAGE","content":"lo","traceId":"{id}","end":false}}"#),
            format!(r#"{{"type":"MESSAGE","content":"[END]","traceId":"{id}","end":true}}"#),
        ] {
            peer.deliver(&frame);
        }
        settle().await;

        let timeline = client.snapshot().timeline;
        assert_eq!(contents(&client), vec!["Hi?", "Hello"]);
        assert_eq!(timeline.entries()[0].role, Role::User);
        assert_eq!(timeline.entries()[1].correlation_id, Some(id));
        assert!(!client.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn text_tokens_and_first_message() {
        let (client, _connector, mut peer, _peers) = started().await;
        client.select(Some(chat("c1")));
        let _ = peer.recv().await.unwrap();

        peer.deliver(r#"{"type":"FIRST_MESSAGE","content":"from elsewhere"}"#);
        peer.deliver("Sure");
        peer.deliver(", here");
        peer.deliver("[END]");
        settle().await;

        assert_eq!(contents(&client), vec!["from elsewhere", "Sure, here"]);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_clears_loading() {
        let (client, _connector, mut peer, _peers) = started().await;
        client.select(Some(chat("c1")));
        let _ = peer.recv().await.unwrap();

        client.submit("Hi").await.unwrap();
        peer.deliver(r#"{"type":"ERROR","error":"model unavailable"}"#);
        settle().await;

        assert!(!client.is_loading());
        assert_eq!(
            client.snapshot().directory.last_error.as_deref(),
            Some("model unavailable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_clears_loading() {
        let (connector, _peers) = FakeConnector::new();
        connector.refuse_all(true);
        let mut config = config();
        config.reconnect.max_retries = 0;
        let client = ChatClient::new(&config, connector.clone());

        client.select(Some(chat("c1")));
        let result = client.submit("Hi").await;

        assert!(matches!(result, Err(ClientError::ConnectionFailed { retries: 0 })));
        assert!(!client.is_loading());
        assert_eq!(contents(&client), vec!["Hi"]);
        assert_eq!(client.status(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_refreshes_directory() {
        let (client, connector, peer, _peers) = started().await;
        client.select(Some(chat("c1")));
        settle().await;

        peer.close();
        settle().await;
        assert_eq!(client.status(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(client.status(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_detaches_callbacks() {
        let (client, _connector, peer, _peers) = started().await;
        client.shutdown();

        peer.deliver(r#"{"type":"CHAT_LIST","chats":[]}"#);
        settle().await;
        assert_eq!(client.snapshot().directory.chats.len(), 2);
        assert_eq!(client.status(), ConnectionState::Disconnected);
        assert_eq!(client.connection().phase(), crate::connection::Phase::Idle);
    }
}
