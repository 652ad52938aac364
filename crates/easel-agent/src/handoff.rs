//! Hand-off tools: how one swarm agent passes control to another.
//!
//! Each outgoing edge of an agent becomes a tool named
//! `transfer_to_<agent>`. Calling it never reaches a [`Tool`] implementation;
//! the swarm runner intercepts the call and applies the transfer to its state.
//!
//! [`Tool`]: easel_tools::Tool

use serde_json::json;

use easel_core::config::HandoffConfig;
use easel_core::types::{ConversationMessage, HIDDEN_MARKER};
use easel_providers::ToolDefinition;

pub const TRANSFER_PREFIX: &str = "transfer_to_";

/// Appended to every hand-off description.
pub const HANDOFF_RULES: &str = "\nIMPORTANT RULES:
1. You MUST complete the other tool calls and wait for their result BEFORE attempting to transfer to another agent
2. Do NOT call this handoff tool with other tools simultaneously
3. Always wait for the result of other tool calls before making this handoff call";

/// An outgoing edge from one agent to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub agent_name: String,
    pub description: Option<String>,
}

impl Handoff {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tool_name(&self) -> String {
        tool_name(&self.agent_name)
    }

    /// Tool definition exposed to the model. The tool takes no arguments.
    pub fn definition(&self) -> ToolDefinition {
        let description = match &self.description {
            Some(d) => d.trim().to_string(),
            None => format!("Ask agent '{}' for help", self.agent_name),
        };
        ToolDefinition {
            name: self.tool_name(),
            description: format!("{description}\n{HANDOFF_RULES}"),
            parameters_schema: json!({ "type": "object", "properties": {} }),
        }
    }
}

impl From<&HandoffConfig> for Handoff {
    fn from(config: &HandoffConfig) -> Self {
        Self {
            agent_name: config.agent_name.clone(),
            description: config.description.clone(),
        }
    }
}

/// Lower-case the name and collapse whitespace runs to `_`.
pub fn normalize_agent_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn tool_name(agent_name: &str) -> String {
    format!("{TRANSFER_PREFIX}{}", normalize_agent_name(agent_name))
}

/// The hand-off a tool call refers to, if any.
pub fn find<'a>(handoffs: &'a [Handoff], tool_name: &str) -> Option<&'a Handoff> {
    if !tool_name.starts_with(TRANSFER_PREFIX) {
        return None;
    }
    handoffs.iter().find(|h| h.tool_name() == tool_name)
}

/// The tool result recorded for a hand-off. Visible to the model, hidden from
/// the end user.
pub fn transfer_message(tool_call_id: &str, agent_name: &str) -> ConversationMessage {
    ConversationMessage::tool_result(
        tool_call_id,
        format!("{HIDDEN_MARKER} Successfully transferred to {agent_name}"),
    )
}
