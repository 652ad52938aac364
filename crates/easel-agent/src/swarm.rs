//! Multi-agent swarm: named agents passing control through hand-off tools.
//!
//! All agents share one model client. The active agent's own tools plus its
//! hand-off tools are offered to the model on each step. A hand-off call is
//! never executed as a tool: the runner appends the hidden transfer message
//! and switches the active agent, and the next step runs as the destination.
//!
//! After every step the runner emits a [`RawEvent::Snapshot`] of the whole
//! transcript; the translator persists only what lies past its high-water
//! mark.

use anyhow::bail;
use async_stream::try_stream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use easel_core::types::{ConversationMessage, Role};

use crate::handoff;
use crate::runtime::{AgentDefinition, ModelClient, RunContext, StepEvent, execute_tool, model_step};
use crate::{MessageDelta, RawEvent, RawEventStream};

/// Agent to start a turn with: the speaker of the most recent assistant
/// message if it names a known agent, otherwise `default_agent`. Older
/// assistant messages are never consulted.
pub fn select_active_agent(
    history: &[ConversationMessage],
    agent_names: &[&str],
    default_agent: &str,
) -> String {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| m.name.as_deref())
        .filter(|name| agent_names.contains(name))
        .unwrap_or(default_agent)
        .to_string()
}

/// Which agent holds control, and the transcript so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmState {
    pub active_agent: String,
    pub messages: Vec<ConversationMessage>,
}

impl SwarmState {
    pub fn new(active_agent: impl Into<String>, messages: Vec<ConversationMessage>) -> Self {
        Self {
            active_agent: active_agent.into(),
            messages,
        }
    }

    /// Record a hand-off: append the hidden transfer message for the call and
    /// make `destination` active.
    pub fn apply_handoff(&mut self, tool_call_id: &str, destination: &str) {
        self.messages
            .push(handoff::transfer_message(tool_call_id, destination));
        self.active_agent = destination.to_string();
    }
}

/// Drives a set of agents connected by hand-off edges.
#[derive(Clone)]
pub struct SwarmRunner {
    client: ModelClient,
    agents: Vec<AgentDefinition>,
    default_agent: String,
}

impl SwarmRunner {
    /// Build a swarm. Fails when there are no agents, names repeat, a
    /// hand-off points at an unknown agent, or the default is unknown.
    /// Without a default, the first agent starts.
    pub fn new(
        client: ModelClient,
        agents: Vec<AgentDefinition>,
        default_agent: Option<&str>,
    ) -> anyhow::Result<Self> {
        let Some(first) = agents.first() else {
            bail!("swarm has no agents");
        };
        let default_agent = default_agent.unwrap_or(&first.name).to_string();

        let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
        for (i, agent) in agents.iter().enumerate() {
            if names[..i].contains(&agent.name.as_str()) {
                bail!("duplicate agent name '{}'", agent.name);
            }
            for edge in &agent.handoffs {
                if !names.contains(&edge.agent_name.as_str()) {
                    bail!(
                        "agent '{}' hands off to unknown agent '{}'",
                        agent.name,
                        edge.agent_name
                    );
                }
            }
        }
        if !names.contains(&default_agent.as_str()) {
            bail!("default agent '{default_agent}' is not defined");
        }

        Ok(Self {
            client,
            agents,
            default_agent,
        })
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    /// Starting state for a conversation.
    pub fn initial_state(&self, history: Vec<ConversationMessage>) -> SwarmState {
        let active = select_active_agent(&history, &self.agent_names(), &self.default_agent);
        SwarmState::new(active, history)
    }

    fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// Stream the turn. Stops when the active agent answers without tool
    /// calls or the iteration limit is reached.
    pub fn run(&self, history: Vec<ConversationMessage>, ctx: RunContext) -> RawEventStream {
        let swarm = self.clone();
        let mut state = self.initial_state(history);
        info!(session_id = %ctx.session_id, agent = %state.active_agent, "Swarm starting");

        Box::pin(try_stream! {
            let max_iterations = swarm.client.settings.max_iterations;
            let mut finished = false;

            for iteration in 0..max_iterations {
                let Some(agent) = swarm.agent(&state.active_agent) else {
                    Err::<(), _>(anyhow::anyhow!("active agent '{}' is not defined", state.active_agent))?;
                    return;
                };
                debug!(iteration, agent = %agent.name, "Swarm step");

                let request = swarm.client.request(&agent.system_prompt, &state.messages, agent.tool_definitions());
                let mut assistant = None;
                let mut step = std::pin::pin!(model_step(swarm.client.clone(), request, Some(agent.name.clone())));
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
                state.messages.push(assistant);
                yield RawEvent::Snapshot { messages: state.messages.clone() };

                if calls.is_empty() {
                    finished = true;
                    break;
                }

                for call in &calls {
                    if let Some(edge) = handoff::find(&agent.handoffs, call.name()) {
                        info!(from = %agent.name, to = %edge.agent_name, "Hand-off");
                        state.apply_handoff(&call.id, &edge.agent_name);
                        continue;
                    }
                    let output = execute_tool(&agent.tools, call, &ctx).await;
                    yield RawEvent::Delta(MessageDelta::tool_result(output.content.clone()));
                    state.messages.push(ConversationMessage::tool_result(&call.id, output.content));
                }
                yield RawEvent::Snapshot { messages: state.messages.clone() };
            }

            if !finished {
                warn!(max_iterations, session_id = %ctx.session_id, "Swarm stopped at iteration limit");
            }
        })
    }
}
