//! Canonical client event protocol.
//!
//! Every turn is delivered to the client as an ordered sequence of
//! [`ClientEvent`]s, one JSON object per event, ending in exactly one
//! terminal event (`done` or `error`).

use serde::{Deserialize, Serialize};

use crate::types::ConversationMessage;

/// Placeholder sent as `arguments` when a tool call is first named.
pub const EMPTY_ARGUMENTS: &str = "{}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Full transcript so far.
    AllMessages { messages: Vec<ConversationMessage> },

    /// Incremental assistant text.
    Delta { text: String },

    /// A tool call has been named. `arguments` is a placeholder; the real
    /// arguments follow as `tool_call_arguments` fragments.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// Raw argument fragment for a previously announced tool call.
    ToolCallArguments { id: String, text: String },

    /// Turn complete.
    Done,

    /// Turn aborted.
    Error { error: String },
}

impl ClientEvent {
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>) -> Self {
        ClientEvent::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: EMPTY_ARGUMENTS.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ClientEvent::Error {
            error: message.into(),
        }
    }

    /// `done` and `error` end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientEvent::Done | ClientEvent::Error { .. })
    }
}
