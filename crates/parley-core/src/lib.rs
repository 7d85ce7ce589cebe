//! Core domain types for parley.
//!
//! This crate provides the vocabulary shared by the transport layer and the
//! front-end:
//!
//! - **Identifiers**: `ChatId` (assigned by the server) and `CorrelationId`
//!   (binds streamed fragments to one reply)
//! - **Timeline types**: `MessageEntry`, `Role`, `ChatSummary`
//! - **Connection status**: the externally observed `ConnectionState`
//! - **Error types**: `CoreError`
//!
//! # Example
//!
//! ```
//! use parley_core::{ChatId, CorrelationId, MessageEntry};
//!
//! let chat = ChatId::parse("c1").unwrap();
//! assert_eq!(chat.as_str(), "c1");
//!
//! let trace = CorrelationId::generate();
//! let entry = MessageEntry::assistant("Hello", Some(trace.clone()));
//! assert!(entry.is_assistant_turn(&trace));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{ChatId, CorrelationId, IdError};
pub use types::{ChatSummary, ConnectionState, MessageEntry, Role};
