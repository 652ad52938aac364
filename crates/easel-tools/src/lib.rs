//! Tools exposed to agents during a turn.
//!
//! Tools are capabilities exposed to the LLM during agent runs.
//! Each tool implements the [`Tool`] trait. Agents receive an explicit
//! [`ToolSet`] at construction; there is no process-wide registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use easel_core::config::ImageModelSelection;

pub mod image_generation;
pub mod notify;
pub mod write_plan;

pub use image_generation::GenerateImageTool;
pub use notify::{ChannelNotifier, Notification, Notifier};
pub use write_plan::WritePlanTool;

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub canvas_id: Option<String>,
    /// Id of the call being executed.
    pub tool_call_id: String,
    /// Image provider and model selected for this turn.
    pub image_model: Option<ImageModelSelection>,
    /// Out-of-band channel to the session's client and canvas viewers.
    pub notifier: Arc<dyn Notifier>,
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the LLM (e.g., "generate_image").
    fn name(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Human-readable description for the LLM.
    fn description(&self) -> &str;

    /// Execute the tool with the given parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolOutput>;
}

/// The tools one agent may call, keyed by name, in registration order.
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A new set holding only the named tools that exist here, in `names` order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> ToolSet {
        ToolSet {
            tools: names
                .iter()
                .filter_map(|n| self.get(n.as_ref()).cloned())
                .collect(),
        }
    }
}
