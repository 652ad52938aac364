//! Single-agent runtime loop: stream the model, execute tool calls, repeat.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use easel_core::config::{Config, ImageModelSelection};
use easel_core::types::{ConversationMessage, ToolCallFragment, ToolCallRef};
use easel_providers::{CompletionRequest, Credentials, LlmProvider, ToolDefinition};
use easel_tools::{Notifier, ToolContext, ToolOutput, ToolSet};

use crate::handoff::Handoff;
use crate::{MessageDelta, RawEvent, RawEventStream};

/// Model parameters shared by every agent of a turn.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Upper bound on model calls per turn.
    pub max_iterations: u32,
}

impl ModelSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.default_model(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            max_iterations: config.max_tool_iterations(),
        }
    }
}

/// A configured language-model client.
#[derive(Clone)]
pub struct ModelClient {
    pub provider: Arc<dyn LlmProvider>,
    pub credentials: Credentials,
    pub settings: ModelSettings,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, credentials: Credentials, settings: ModelSettings) -> Self {
        Self {
            provider,
            credentials,
            settings,
        }
    }

    pub(crate) fn request(
        &self,
        system_prompt: &str,
        messages: &[ConversationMessage],
        tools: Vec<ToolDefinition>,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tools,
            system: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
        }
    }
}

/// Per-turn context handed to every tool call.
#[derive(Clone)]
pub struct RunContext {
    pub session_id: String,
    pub canvas_id: Option<String>,
    pub image_model: Option<ImageModelSelection>,
    pub notifier: Arc<dyn Notifier>,
}

impl RunContext {
    fn tool_context(&self, tool_call_id: &str) -> ToolContext {
        ToolContext {
            session_id: self.session_id.clone(),
            canvas_id: self.canvas_id.clone(),
            tool_call_id: tool_call_id.to_string(),
            image_model: self.image_model.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

/// A named agent: instructions, the tools it may call, and its hand-off edges.
#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub system_prompt: String,
    pub tools: ToolSet,
    pub handoffs: Vec<Handoff>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, tools: ToolSet) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools,
            handoffs: Vec::new(),
        }
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Own tools followed by one hand-off tool per outgoing edge.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = tool_definitions(&self.tools);
        defs.extend(self.handoffs.iter().map(Handoff::definition));
        defs
    }
}

pub fn tool_definitions(tools: &ToolSet) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters_schema: t.parameters_schema(),
        })
        .collect()
}

/// Rebuilds complete tool calls from streamed fragments, keyed by index.
#[derive(Debug, Default)]
pub(crate) struct ToolCallAssembler {
    calls: BTreeMap<usize, ToolCallRef>,
}

impl ToolCallAssembler {
    /// Fold a fragment in. A named fragment opens a new call at its index
    /// unless it repeats the id of the call already open there; the others
    /// extend the open call. The fragment's `call_id` is filled in from the
    /// call it belongs to.
    pub(crate) fn push(&mut self, fragment: &mut ToolCallFragment) {
        let repeats_open_call = match (fragment.call_id.as_deref(), self.calls.get(&fragment.index)) {
            (Some(id), Some(open)) => !id.is_empty() && open.id == id,
            _ => false,
        };
        if fragment.is_named() && !repeats_open_call {
            let id = fragment
                .call_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            fragment.call_id = Some(id.clone());
            let name = fragment.name.clone().unwrap_or_default();
            self.calls.insert(
                fragment.index,
                ToolCallRef::new(id, name, fragment.arguments_delta.clone()),
            );
        } else if let Some(call) = self.calls.get_mut(&fragment.index) {
            call.function.arguments.push_str(&fragment.arguments_delta);
            fragment.call_id = Some(call.id.clone());
        } else {
            debug!(index = fragment.index, "Fragment for unopened tool call, ignoring");
        }
    }

    pub(crate) fn finish(self) -> Vec<ToolCallRef> {
        self.calls.into_values().collect()
    }
}

pub(crate) enum StepEvent {
    Delta(MessageDelta),
    Finished(ConversationMessage),
}

/// One model call: forward deltas as they arrive, then the assembled
/// assistant message.
pub(crate) fn model_step(
    client: ModelClient,
    request: CompletionRequest,
    agent_name: Option<String>,
) -> impl Stream<Item = anyhow::Result<StepEvent>> + Send {
    try_stream! {
        debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "Requesting completion");
        let mut chunks = client.provider.stream(&request, &client.credentials).await?;
        let mut text = String::new();
        let mut calls = ToolCallAssembler::default();

        while let Some(chunk) = chunks.next().await {
            let mut chunk = chunk?;
            for fragment in &mut chunk.tool_calls {
                calls.push(fragment);
            }
            if let Some(usage) = &chunk.usage {
                debug!(input_tokens = ?usage.input_tokens, output_tokens = ?usage.output_tokens, "Usage");
            }
            let delta = MessageDelta {
                content: chunk.delta,
                tool_calls: chunk.tool_calls,
                is_tool_result: false,
            };
            if delta.is_empty() {
                continue;
            }
            if let Some(t) = &delta.content {
                text.push_str(t);
            }
            yield StepEvent::Delta(delta);
        }

        let mut message = ConversationMessage::assistant(text).with_tool_calls(calls.finish());
        if let Some(name) = agent_name {
            message = message.with_name(name);
        }
        yield StepEvent::Finished(message);
    }
}

/// Run one tool call. Failures become error output for the model.
pub(crate) async fn execute_tool(tools: &ToolSet, call: &ToolCallRef, ctx: &RunContext) -> ToolOutput {
    let Some(tool) = tools.get(call.name()) else {
        warn!(tool = call.name(), "Model called unknown tool");
        return ToolOutput::error(format!("Unknown tool: {}", call.name()));
    };

    info!(tool = call.name(), session_id = %ctx.session_id, "Executing tool");
    match tool.execute(call.arguments_json(), &ctx.tool_context(&call.id)).await {
        Ok(output) => output,
        Err(e) => {
            warn!(%e, tool = call.name(), "Tool execution error");
            ToolOutput::error(format!("Tool error: {e}"))
        }
    }
}

/// Drives one tool-augmented agent over a conversation.
#[derive(Clone)]
pub struct AgentRunner {
    client: ModelClient,
    agent: AgentDefinition,
}

impl AgentRunner {
    pub fn new(client: ModelClient, agent: AgentDefinition) -> Self {
        Self { client, agent }
    }

    /// Stream the turn. Emits an update after every model call and after
    /// every round of tool results; stops when the model answers without
    /// tool calls. Model failures end the stream with an error.
    pub fn run(&self, history: Vec<ConversationMessage>, ctx: RunContext) -> RawEventStream {
        let client = self.client.clone();
        let agent = self.agent.clone();

        Box::pin(try_stream! {
            let mut messages = history;
            let tool_defs = tool_definitions(&agent.tools);
            let max_iterations = client.settings.max_iterations;
            let mut finished = false;

            for iteration in 0..max_iterations {
                debug!(iteration, session_id = %ctx.session_id, "Agent loop iteration");
                let request = client.request(&agent.system_prompt, &messages, tool_defs.clone());

                let mut assistant = None;
                let mut step = std::pin::pin!(model_step(client.clone(), request, None));
                while let Some(event) = step.next().await {
                    match event? {
                        StepEvent::Delta(delta) => {
                            yield RawEvent::Delta(delta);
                        }
                        StepEvent::Finished(message) => assistant = Some(message),
                    }
                }
                let Some(assistant) = assistant else {
                    break;
                };

                let calls = assistant.tool_calls.clone();
                messages.push(assistant.clone());
                yield RawEvent::Update { messages: vec![assistant] };

                if calls.is_empty() {
                    finished = true;
                    break;
                }

                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    let output = execute_tool(&agent.tools, call, &ctx).await;
                    yield RawEvent::Delta(MessageDelta::tool_result(output.content.clone()));
                    results.push(ConversationMessage::tool_result(&call.id, output.content));
                }
                messages.extend(results.iter().cloned());
                yield RawEvent::Update { messages: results };
            }

            if !finished {
                warn!(max_iterations, session_id = %ctx.session_id, "Agent stopped at iteration limit");
            }
        })
    }
}
