//! Timeline and directory types.
//!
//! These mirror the shapes the server sends in `CHAT_LIST` and
//! `CHAT_HISTORY` frames, and the connection status the transport layer
//! publishes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{ChatId, CorrelationId};

// =============================================================================
// Connection Status
// =============================================================================

/// Externally observed connection status.
///
/// Only the connection manager transitions this; everything else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A socket is being opened.
    Connecting,
    /// The socket is open and frames flow immediately.
    Connected,
    /// The socket closed; a reconnect may be scheduled.
    Disconnected,
    /// Automatic reconnection gave up. A manual send or connect retries.
    Failed,
}

impl ConnectionState {
    /// Wire/display label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }

    /// Whether frames can be transmitted right now.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the local user.
    User,
    /// Streamed back by the server.
    Assistant,
}

impl Role {
    /// Wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// One entry of the ordered message timeline.
///
/// Entries are append-only by index. After creation, `content` may only be
/// extended, and only for an assistant entry whose correlation id matches the
/// fragment being applied; [`MessageEntry::extend`] is the single mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Text shown to the user.
    pub content: String,
    /// Author.
    pub role: Role,
    /// Reply the entry belongs to. History entries carry it as `id`.
    #[serde(
        default,
        rename = "id",
        alias = "traceId",
        alias = "correlationId",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<CorrelationId>,
}

impl MessageEntry {
    /// Create a user entry.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
            correlation_id: None,
        }
    }

    /// Create an assistant entry.
    #[must_use]
    pub fn assistant(content: impl Into<String>, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
            correlation_id,
        }
    }

    /// Check if this is an assistant entry.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Check if this is the assistant entry for the given reply.
    #[must_use]
    pub fn is_assistant_turn(&self, correlation_id: &CorrelationId) -> bool {
        self.is_assistant() && self.correlation_id.as_ref() == Some(correlation_id)
    }

    /// Append a fragment to the content.
    pub fn extend(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    /// Last character of the content, if any.
    #[must_use]
    pub fn last_char(&self) -> Option<char> {
        self.content.chars().next_back()
    }
}

// =============================================================================
// Chat Directory
// =============================================================================

/// A conversation as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Server-assigned id.
    pub id: ChatId,
    /// Display name.
    pub name: String,
    /// Server-side activity flag.
    #[serde(default)]
    pub active: bool,
}
