//! Message adapter.

use parley_core::{ChatId, CorrelationId, MessageEntry};

use super::{on_frame, send_or_log, send_when_connected};
use crate::connection::ConnectionManager;
use crate::dispatcher::Subscription;
use crate::error::{ClientError, Result};
use crate::protocol::{labels, Fragment, InboundFrame, OutboundFrame};

/// Sends user messages and receives replies and history.
#[derive(Debug, Clone)]
pub struct MessageService {
    connection: ConnectionManager,
}

impl MessageService {
    /// Create a service on top of `connection`.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Send `content` to `chat_id` and return the correlation id the reply
    /// will stream under.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingChatId` without touching the connection
    /// when no chat is given, or the connection error if the socket never
    /// opens.
    pub async fn send_message(&self, chat_id: Option<&ChatId>, content: &str) -> Result<CorrelationId> {
        let chat_id = chat_id.ok_or(ClientError::MissingChatId)?;
        let correlation_id = CorrelationId::generate();

        send_when_connected(
            &self.connection,
            OutboundFrame::send_message(chat_id, content, &correlation_id),
        )
        .await
        .inspect_err(|e| tracing::warn!(chat = %chat_id, error = %e, "Failed to send message"))?;

        tracing::debug!(chat = %chat_id, trace_id = %correlation_id, "Message sent");
        Ok(correlation_id)
    }

    /// Request the history of `chat_id`. Answered by `CHAT_HISTORY`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingChatId` when no chat is given. A
    /// connection failure is logged, not returned.
    pub async fn get_chat_history(&self, chat_id: Option<&ChatId>) -> Result<()> {
        let chat_id = chat_id.ok_or(ClientError::MissingChatId)?;
        send_or_log(
            &self.connection,
            OutboundFrame::get_chat_history(chat_id),
            "get chat history",
        )
        .await;
        Ok(())
    }

    /// Called with a chat's history.
    pub fn on_chat_history<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[MessageEntry]) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::CHAT_HISTORY, move |frame| {
            if let InboundFrame::ChatHistory { messages } = frame {
                callback(messages);
            }
        })
    }

    /// Called with each reply fragment.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Fragment) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::MESSAGE, move |frame| {
            if let InboundFrame::Message(fragment) = frame {
                callback(fragment);
            }
        })
    }

    /// Called with user messages that originated elsewhere.
    pub fn on_first_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::FIRST_MESSAGE, move |frame| {
            if let InboundFrame::FirstMessage { content } = frame {
                callback(content);
            }
        })
    }

    /// Called with server-side errors.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::ERROR, move |frame| {
            if let InboundFrame::Error { error } = frame {
                callback(error);
            }
        })
    }

    /// Called with bare text tokens, including the `[END]` sentinel.
    pub fn on_text_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        on_frame(&self.connection, labels::TEXT, move |frame| {
            if let InboundFrame::Text(text) = frame {
                callback(text);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::dispatcher::EventDispatcher;
    use crate::testing::{FakeConnector, FakePeer};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn service(max_retries: u32) -> (MessageService, Arc<FakeConnector>, UnboundedReceiver<FakePeer>) {
        let (connector, peers) = FakeConnector::new();
        let mut config = ClientConfig::default();
        config.reconnect.max_retries = max_retries;
        let manager = ConnectionManager::new(&config, connector.clone(), EventDispatcher::new());
        (MessageService::new(manager), connector, peers)
    }

    // =========================================================================
    // Outbound Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn send_without_chat_never_touches_connection() {
        let (messages, connector, _peers) = service(10);

        let result = messages.send_message(None, "hello").await;
        assert!(matches!(result, Err(ClientError::MissingChatId)));
        assert_eq!(connector.attempts(), 0);

        let result = messages.get_chat_history(None).await;
        assert!(matches!(result, Err(ClientError::MissingChatId)));
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_carries_returned_id() {
        let (messages, _connector, mut peers) = service(10);
        let chat = ChatId::parse("c1").unwrap();

        let id = messages.send_message(Some(&chat), "Hi").await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        let frame = peer.recv().await.unwrap();

        assert_eq!(frame, OutboundFrame::send_message(&chat, "Hi", &id));
        assert_eq!(frame.payload().unwrap()["traceId"], id.as_str());
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_propagates_connection_failure() {
        let (messages, connector, _peers) = service(1);
        connector.refuse_all(true);
        let chat = ChatId::parse("c1").unwrap();

        let result = messages.send_message(Some(&chat), "Hi").await;
        assert!(matches!(result, Err(ClientError::ConnectionFailed { retries: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn history_failure_is_swallowed() {
        let (messages, connector, _peers) = service(1);
        connector.refuse_all(true);
        let chat = ChatId::parse("c1").unwrap();

        assert!(messages.get_chat_history(Some(&chat)).await.is_ok());
    }

    // =========================================================================
    // Inbound Tests
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn typed_callbacks_receive_payloads() {
        let (messages, _connector, mut peers) = service(10);
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let sink = Arc::clone(&seen);
        let _history = messages.on_chat_history(move |entries| {
            sink.lock().push(format!("history:{}", entries.len()));
        });
        let sink = Arc::clone(&seen);
        let _message = messages.on_message(move |f| {
            sink.lock().push(format!("message:{}:{}", f.content, f.end));
        });
        let sink = Arc::clone(&seen);
        let _first = messages.on_first_message(move |c| sink.lock().push(format!("first:{c}")));
        let sink = Arc::clone(&seen);
        let _error = messages.on_error(move |e| sink.lock().push(format!("error:{e}")));
        let sink = Arc::clone(&seen);
        let _text = messages.on_text_message(move |t| sink.lock().push(format!("text:{t}")));

        let chat = ChatId::parse("c1").unwrap();
        messages.get_chat_history(Some(&chat)).await.unwrap();
        let peer = peers.recv().await.unwrap();

        peer.deliver(r#"{"type":"CHAT_HISTORY","messages":[{"content":"q","role":"user"}]}"#);
        peer.deliver(r#"{"type":"FIRST_MESSAGE","content":"hey"}"#);
        peer.deliver(r#"{"type":"MESSAGE","content":"Hi","traceId":"t1","end":false}"#);
        peer.deliver(r#"{"type":"ERROR"}"#);
        peer.deliver("tok");
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            *seen.lock(),
            vec![
                "history:1",
                "first:hey",
                "message:Hi:false",
                "error:Unknown error occurred",
                "text:tok",
            ]
        );
    }
}
