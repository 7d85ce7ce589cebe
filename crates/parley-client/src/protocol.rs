//! Wire protocol.
//!
//! The socket carries UTF-8 text frames in two shapes:
//!
//! 1. A JSON record with a `type` label (`{"type":"MESSAGE","content":...}`).
//! 2. A bare text token with no envelope, used for low-level streaming and
//!    the literal [`END_SENTINEL`].
//!
//! Outbound frames are always structured. Inbound text is decoded once at
//! the boundary into the closed [`InboundFrame`] union; anything that is not
//! a labelled JSON record falls back to [`InboundFrame::Text`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use parley_core::{ChatId, ChatSummary, CorrelationId, MessageEntry};

/// Token marking the end of a streamed reply.
pub const END_SENTINEL: &str = "[END]";

/// Dispatch labels.
///
/// Server frame labels are upper case; the three locally produced labels
/// (`text`, `connection`, `error`) are lower case.
pub mod labels {
    /// Outbound: list all chats.
    pub const GET_CHATS: &str = "GET_CHATS";
    /// Outbound: create a chat.
    pub const CREATE_CHAT: &str = "CREATE_CHAT";
    /// Outbound: delete a chat.
    pub const DELETE_CHAT: &str = "DELETE_CHAT";
    /// Outbound: send a user message.
    pub const SEND_MESSAGE: &str = "SEND_MESSAGE";
    /// Outbound: fetch a chat's history.
    pub const GET_CHAT_HISTORY: &str = "GET_CHAT_HISTORY";

    /// Inbound: full chat list.
    pub const CHAT_LIST: &str = "CHAT_LIST";
    /// Inbound: a chat was created.
    pub const NEW_CHAT: &str = "NEW_CHAT";
    /// Inbound: a chat was deleted.
    pub const CHAT_DELETED: &str = "CHAT_DELETED";
    /// Inbound: history of one chat.
    pub const CHAT_HISTORY: &str = "CHAT_HISTORY";
    /// Inbound: one fragment of an assistant reply.
    pub const MESSAGE: &str = "MESSAGE";
    /// Inbound: a user message that originated elsewhere.
    pub const FIRST_MESSAGE: &str = "FIRST_MESSAGE";
    /// Inbound: server-side error.
    pub const ERROR: &str = "ERROR";

    /// Local: unlabelled text frame.
    pub const TEXT: &str = "text";
    /// Local: connection status change.
    pub const CONNECTION: &str = "connection";
    /// Local: transport-level error.
    pub const TRANSPORT_ERROR: &str = "error";
}

// =============================================================================
// Outbound
// =============================================================================

/// A frame headed for the server.
///
/// Immutable once built; the connection manager serializes it when the
/// socket is open and queues it untouched otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl OutboundFrame {
    /// Build a frame with an arbitrary label and payload.
    #[must_use]
    pub fn new(frame_type: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload,
        }
    }

    /// `GET_CHATS`.
    #[must_use]
    pub fn get_chats() -> Self {
        Self::new(labels::GET_CHATS, None)
    }

    /// `CREATE_CHAT` with the chat name.
    #[must_use]
    pub fn create_chat(name: &str) -> Self {
        Self::new(labels::CREATE_CHAT, Some(json!({ "name": name })))
    }

    /// `DELETE_CHAT` for the given chat.
    #[must_use]
    pub fn delete_chat(chat_id: &ChatId) -> Self {
        Self::new(labels::DELETE_CHAT, Some(json!({ "chatId": chat_id })))
    }

    /// `SEND_MESSAGE` with the user's text and the reply's correlation id.
    #[must_use]
    pub fn send_message(chat_id: &ChatId, content: &str, correlation_id: &CorrelationId) -> Self {
        Self::new(
            labels::SEND_MESSAGE,
            Some(json!({
                "chatId": chat_id,
                "content": content,
                "traceId": correlation_id,
            })),
        )
    }

    /// `GET_CHAT_HISTORY` for the given chat.
    #[must_use]
    pub fn get_chat_history(chat_id: &ChatId) -> Self {
        Self::new(labels::GET_CHAT_HISTORY, Some(json!({ "chatId": chat_id })))
    }

    /// The frame's label.
    #[must_use]
    pub fn frame_type(&self) -> &str {
        &self.frame_type
    }

    /// The frame's payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Serialize to the wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// One fragment of a streamed assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Text to append.
    pub content: String,
    /// Reply this fragment belongs to; absent on malformed frames.
    pub correlation_id: Option<CorrelationId>,
    /// Whether this is the last fragment of the reply.
    pub end: bool,
}

impl Fragment {
    /// Whether this fragment is only the end-of-stream terminator.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.end && (self.content == END_SENTINEL || self.content.is_empty())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `CHAT_LIST`.
    ChatList {
        /// All chats known to the server.
        chats: Vec<ChatSummary>,
    },
    /// `NEW_CHAT`.
    NewChat {
        /// The created chat.
        chat: ChatSummary,
    },
    /// `CHAT_DELETED`.
    ChatDeleted {
        /// The removed chat.
        chat_id: ChatId,
    },
    /// `CHAT_HISTORY`.
    ChatHistory {
        /// Entries in display order.
        messages: Vec<MessageEntry>,
    },
    /// `MESSAGE`.
    Message(Fragment),
    /// `FIRST_MESSAGE`.
    FirstMessage {
        /// The user's text.
        content: String,
    },
    /// `ERROR`.
    Error {
        /// Server-provided description.
        error: String,
    },
    /// A labelled record whose label or shape is not recognised.
    Unknown {
        /// The record's `type` label.
        frame_type: String,
        /// The full record.
        raw: Value,
    },
    /// Anything that is not a labelled JSON record.
    Text(String),
}

/// Wire shapes of the recognised labels.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum KnownFrame {
    #[serde(rename = "CHAT_LIST")]
    ChatList {
        #[serde(default)]
        chats: Vec<ChatSummary>,
    },
    #[serde(rename = "NEW_CHAT")]
    NewChat { chat: ChatSummary },
    #[serde(rename = "CHAT_DELETED")]
    ChatDeleted {
        #[serde(rename = "chatId")]
        chat_id: ChatId,
    },
    #[serde(rename = "CHAT_HISTORY")]
    ChatHistory {
        #[serde(default)]
        messages: Vec<MessageEntry>,
    },
    #[serde(rename = "MESSAGE")]
    Message {
        #[serde(default)]
        content: String,
        #[serde(default, rename = "traceId")]
        trace_id: Option<CorrelationId>,
        #[serde(default)]
        end: bool,
    },
    #[serde(rename = "FIRST_MESSAGE")]
    FirstMessage {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "ERROR")]
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl From<KnownFrame> for InboundFrame {
    fn from(frame: KnownFrame) -> Self {
        match frame {
            KnownFrame::ChatList { chats } => Self::ChatList { chats },
            KnownFrame::NewChat { chat } => Self::NewChat { chat },
            KnownFrame::ChatDeleted { chat_id } => Self::ChatDeleted { chat_id },
            KnownFrame::ChatHistory { messages } => Self::ChatHistory { messages },
            KnownFrame::Message {
                content,
                trace_id,
                end,
            } => Self::Message(Fragment {
                content,
                correlation_id: trace_id,
                end,
            }),
            KnownFrame::FirstMessage { content } => Self::FirstMessage { content },
            KnownFrame::Error { error } => Self::Error {
                error: error.unwrap_or_else(|| "Unknown error occurred".to_string()),
            },
        }
    }
}

impl InboundFrame {
    /// Decode one text frame. Never fails: unparseable input becomes `Text`.
    #[must_use]
    pub fn decode(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Self::Text(text.to_string());
        };

        let Some(frame_type) = value.get("type").and_then(Value::as_str).map(str::to_owned)
        else {
            return Self::Text(text.to_string());
        };

        match serde_json::from_value::<KnownFrame>(value.clone()) {
            Ok(known) => known.into(),
            Err(e) => {
                tracing::debug!(frame_type = %frame_type, error = %e, "Unrecognised inbound frame");
                Self::Unknown {
                    frame_type,
                    raw: value,
                }
            }
        }
    }

    /// Label the frame is dispatched under.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::ChatList { .. } => labels::CHAT_LIST,
            Self::NewChat { .. } => labels::NEW_CHAT,
            Self::ChatDeleted { .. } => labels::CHAT_DELETED,
            Self::ChatHistory { .. } => labels::CHAT_HISTORY,
            Self::Message(_) => labels::MESSAGE,
            Self::FirstMessage { .. } => labels::FIRST_MESSAGE,
            Self::Error { .. } => labels::ERROR,
            Self::Unknown { frame_type, .. } => frame_type,
            Self::Text(_) => labels::TEXT,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
