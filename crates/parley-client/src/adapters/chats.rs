//! Chat directory adapter.

use parley_core::{ChatId, ChatSummary, ConnectionState};

use super::{on_frame, send_or_log};
use crate::connection::ConnectionManager;
use crate::dispatcher::Subscription;
use crate::events::ClientEvent;
use crate::protocol::{labels, InboundFrame, OutboundFrame};

/// Lists, creates and deletes chats.
#[derive(Debug, Clone)]
pub struct ChatService {
    connection: ConnectionManager,
}

impl ChatService {
    /// Create a service on top of `connection`.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Request the chat list. Answered by `CHAT_LIST`.
    pub async fn get_chats(&self) {
        send_or_log(&self.connection, OutboundFrame::get_chats(), "get chats").await;
    }

    /// Create a chat. Answered by `NEW_CHAT`.
    pub async fn create_chat(&self, name: &str) {
        send_or_log(&self.connection, OutboundFrame::create_chat(name), "create chat").await;
    }

    /// Delete a chat. Answered by `CHAT_DELETED`.
    pub async fn delete_chat(&self, chat_id: &ChatId) {
        send_or_log(&self.connection, OutboundFrame::delete_chat(chat_id), "delete chat").await;
    }

    /// Called with the full chat list.
    pub fn on_chat_list<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[ChatSummary]) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::CHAT_LIST, move |frame| {
            if let InboundFrame::ChatList { chats } = frame {
                callback(chats);
            }
        })
    }

    /// Called with each newly created chat.
    pub fn on_new_chat<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatSummary) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::NEW_CHAT, move |frame| {
            if let InboundFrame::NewChat { chat } = frame {
                callback(chat);
            }
        })
    }

    /// Called with the id of each deleted chat.
    pub fn on_chat_deleted<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatId) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::CHAT_DELETED, move |frame| {
            if let InboundFrame::ChatDeleted { chat_id } = frame {
                callback(chat_id);
            }
        })
    }

    /// Called on every connection status change.
    pub fn on_connection_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.connection
            .dispatcher()
            .subscribe(labels::CONNECTION, move |event: &ClientEvent| {
                if let ClientEvent::Connection(state) = event {
                    callback(*state);
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::dispatcher::EventDispatcher;
    use crate::testing::FakeConnector;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn service() -> (
        ChatService,
        Arc<FakeConnector>,
        tokio::sync::mpsc::UnboundedReceiver<crate::testing::FakePeer>,
    ) {
        let (connector, peers) = FakeConnector::new();
        let manager = ConnectionManager::new(
            &ClientConfig::default(),
            connector.clone(),
            EventDispatcher::new(),
        );
        (ChatService::new(manager), connector, peers)
    }

    #[tokio::test(start_paused = true)]
    async fn requests_wait_for_connection() {
        let (chats, _connector, mut peers) = service();

        let create = {
            let chats = chats.clone();
            tokio::spawn(async move { chats.create_chat("Plans").await })
        };

        let mut peer = peers.recv().await.unwrap();
        create.await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), OutboundFrame::create_chat("Plans"));

        chats.get_chats().await;
        assert_eq!(peer.recv().await.unwrap(), OutboundFrame::get_chats());

        let id = ChatId::parse("c1").unwrap();
        chats.delete_chat(&id).await;
        assert_eq!(peer.recv().await.unwrap(), OutboundFrame::delete_chat(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_is_swallowed() {
        let (connector, _peers) = FakeConnector::new();
        connector.refuse_all(true);
        let mut config = ClientConfig::default();
        config.reconnect.max_retries = 1;
        let manager = ConnectionManager::new(&config, connector, EventDispatcher::new());
        let chats = ChatService::new(manager);

        // Resolves instead of erroring
        chats.get_chats().await;
    }

    #[tokio::test(start_paused = true)]
    async fn typed_callbacks_receive_payloads() {
        let (chats, _connector, mut peers) = service();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let sink = Arc::clone(&seen);
        let _list = chats.on_chat_list(move |list| {
            sink.lock().push(format!("list:{}", list.len()));
        });
        let sink = Arc::clone(&seen);
        let _new = chats.on_new_chat(move |chat| sink.lock().push(format!("new:{}", chat.id)));
        let sink = Arc::clone(&seen);
        let _deleted = chats.on_chat_deleted(move |id| sink.lock().push(format!("deleted:{id}")));
        let sink = Arc::clone(&seen);
        let _status =
            chats.on_connection_status_change(move |state| sink.lock().push(state.to_string()));

        chats.get_chats().await;
        let peer = peers.recv().await.unwrap();
        peer.deliver(r#"{"type":"CHAT_LIST","chats":[{"id":"c1","name":"a"},{"id":"c2","name":"b"}]}"#);
        peer.deliver(r#"{"type":"NEW_CHAT","chat":{"id":"c3","name":"c"}}"#);
        peer.deliver(r#"{"type":"CHAT_DELETED","chatId":"c1"}"#);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(
            *seen.lock(),
            vec!["connecting", "connected", "list:2", "new:c3", "deleted:c1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_callback_stops_receiving() {
        let (chats, _connector, mut peers) = service();
        let count = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&count);
        let sub = chats.on_chat_list(move |_| *sink.lock() += 1);

        chats.get_chats().await;
        let peer = peers.recv().await.unwrap();
        peer.deliver(r#"{"type":"CHAT_LIST","chats":[]}"#);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        sub.unsubscribe();
        sub.unsubscribe();
        peer.deliver(r#"{"type":"CHAT_LIST","chats":[]}"#);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        assert_eq!(*count.lock(), 1);
    }
}
