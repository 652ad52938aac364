//! Scripted fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use easel_core::store::PersistenceGateway;
use easel_core::types::ToolCallFragment;
use easel_core::{EaselError, Result};
use easel_providers::{ChunkStream, CompletionChunk, CompletionRequest, Credentials, LlmProvider};
use easel_tools::ChannelNotifier;

use crate::runtime::{ModelClient, ModelSettings, RunContext};
use crate::{RawEvent, RawEventStream};

/// Replays one scripted response per `stream` call and records the requests.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<Vec<CompletionChunk>, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Vec<CompletionChunk>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::default(),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::from([Err(message.to_string())])),
            requests: Mutex::default(),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        _credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(chunks)) => Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok::<_, anyhow::Error>)))),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("script exhausted")),
        }
    }
}

pub fn client(provider: Arc<ScriptedProvider>) -> ModelClient {
    ModelClient::new(
        provider,
        Credentials::None,
        ModelSettings {
            model: "test-model".into(),
            max_tokens: 256,
            temperature: Some(0.0),
            max_iterations: 8,
        },
    )
}

pub fn context() -> RunContext {
    RunContext {
        session_id: "s1".into(),
        canvas_id: None,
        image_model: None,
        notifier: Arc::new(ChannelNotifier::new().0),
    }
}

pub fn named(index: usize, call_id: &str, name: &str) -> ToolCallFragment {
    ToolCallFragment {
        index,
        call_id: Some(call_id.into()),
        name: Some(name.into()),
        arguments_delta: String::new(),
    }
}

pub fn fragment(index: usize, arguments: &str) -> ToolCallFragment {
    ToolCallFragment {
        index,
        call_id: None,
        name: None,
        arguments_delta: arguments.into(),
    }
}

pub async fn collect(stream: RawEventStream) -> Vec<anyhow::Result<RawEvent>> {
    stream.collect().await
}

/// In-memory gateway recording every persisted message.
#[derive(Default)]
pub struct MemoryGateway {
    pub messages: Mutex<Vec<(String, String, String)>>,
    pub canvases: Mutex<HashMap<String, String>>,
    pub fail_writes: bool,
}

impl MemoryGateway {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn persisted(&self) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, m)| serde_json::from_str(m).unwrap())
            .collect()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_message(&self, session_id: &str, role: &str, message: &str) -> Result<()> {
        if self.fail_writes {
            return Err(EaselError::Storage("disk full".into()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((session_id.into(), role.into(), message.into()));
        Ok(())
    }

    async fn get_canvas_data(&self, canvas_id: &str) -> Result<Option<Value>> {
        Ok(self
            .canvases
            .lock()
            .unwrap()
            .get(canvas_id)
            .map(|doc| serde_json::from_str(doc).unwrap()))
    }

    async fn save_canvas_data(&self, canvas_id: &str, document: &str) -> Result<()> {
        self.canvases
            .lock()
            .unwrap()
            .insert(canvas_id.into(), document.into());
        Ok(())
    }
}
