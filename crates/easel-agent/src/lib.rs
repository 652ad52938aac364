//! Agent runtime: runners, hand-offs, and client event translation.
//!
//! A turn is one pipeline. A runner ([`AgentRunner`] or [`SwarmRunner`])
//! streams the model, executes tool calls, and yields [`RawEvent`]s. The
//! [`Translator`] turns those into canonical client events, persisting each
//! completed message once. [`run_turn`] wires the two together.

use std::pin::Pin;

use futures::Stream;

use easel_core::types::{ConversationMessage, ToolCallFragment};

pub mod handoff;
pub mod prompt;
pub mod runtime;
pub mod swarm;
pub mod translator;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

pub use handoff::Handoff;
pub use runtime::{AgentDefinition, AgentRunner, ModelClient, ModelSettings, RunContext};
pub use swarm::{SwarmRunner, SwarmState, select_active_agent};
pub use translator::Translator;
pub use turn::{TurnDeps, TurnMode, TurnRequest, run_turn};

/// Events produced by a runner, before translation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// Messages completed by one step, in order.
    Update { messages: Vec<ConversationMessage> },

    /// The full transcript after a step, input history included.
    Snapshot { messages: Vec<ConversationMessage> },

    /// Part of the message currently being generated.
    Delta(MessageDelta),
}

/// Incremental output attached to the message being generated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    /// The delta is a tool's output rather than model text.
    pub is_tool_result: bool,
}

impl MessageDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn fragments(tool_calls: Vec<ToolCallFragment>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            is_tool_result: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty) && self.tool_calls.is_empty()
    }
}

pub type RawEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<RawEvent>> + Send>>;
