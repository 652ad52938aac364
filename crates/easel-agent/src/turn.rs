//! One chat turn, end to end: runner, translator, terminal event.

use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::info;

use easel_core::ClientEvent;
use easel_core::config::ImageModelSelection;
use easel_core::store::PersistenceGateway;
use easel_core::types::ConversationMessage;
use easel_tools::Notifier;

use crate::runtime::{AgentDefinition, AgentRunner, ModelClient, RunContext};
use crate::swarm::SwarmRunner;
use crate::translator::Translator;
use crate::{RawEvent, RawEventStream};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    #[default]
    Single,
    Swarm,
}

/// What the client asked for.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub canvas_id: Option<String>,
    /// Full history, ending with the new user message. Already persisted.
    pub messages: Vec<ConversationMessage>,
    pub image_model: Option<ImageModelSelection>,
    pub mode: TurnMode,
}

/// Long-lived collaborators shared across turns.
#[derive(Clone)]
pub struct TurnDeps {
    pub client: ModelClient,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub notifier: Arc<dyn Notifier>,
    /// Agent for [`TurnMode::Single`].
    pub designer: AgentDefinition,
    /// Agents for [`TurnMode::Swarm`].
    pub swarm: Vec<AgentDefinition>,
    pub default_agent: Option<String>,
}

/// Run one turn and stream its client events. The stream always ends with
/// exactly one `done` or `error`. Dropping it cancels the turn, including any
/// tool call in flight.
pub fn run_turn(request: TurnRequest, deps: TurnDeps) -> impl Stream<Item = ClientEvent> + Send {
    info!(
        session_id = %request.session_id,
        canvas_id = ?request.canvas_id,
        mode = ?request.mode,
        history = request.messages.len(),
        "Starting turn"
    );

    let ctx = RunContext {
        session_id: request.session_id.clone(),
        canvas_id: request.canvas_id,
        image_model: request.image_model,
        notifier: deps.notifier,
    };
    let translator = Translator::new(
        request.session_id,
        deps.gateway,
        request.messages.clone(),
    );

    let raw: anyhow::Result<RawEventStream> = match request.mode {
        TurnMode::Single => Ok(AgentRunner::new(deps.client, deps.designer).run(request.messages, ctx)),
        TurnMode::Swarm => SwarmRunner::new(deps.client, deps.swarm, deps.default_agent.as_deref())
            .map(|swarm| swarm.run(request.messages, ctx)),
    };
    let raw = raw.unwrap_or_else(|e| -> RawEventStream {
        Box::pin(futures::stream::once(async move { Err::<RawEvent, _>(e) }))
    });

    translator.translate(raw)
}
