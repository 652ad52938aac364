//! OpenAI Chat Completions API provider.
//!
//! Implements streaming chat completions via OpenAI's `/v1/chat/completions` API.
//! Also serves as the base for OpenRouter, Ollama, and other OpenAI-compatible providers.
//!
//! Tool-call deltas are forwarded as [`ToolCallFragment`]s exactly as they arrive;
//! reassembly is the consumer's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use easel_core::types::{ConversationMessage, MessageContent, Role, ToolCallFragment};

use crate::sse::parse_sse_stream;
use crate::{
    ChunkStream, ChunkUsage, CompletionChunk, CompletionRequest, Credentials, LlmProvider,
    ToolDefinition,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// API style. Determines minor request and parsing differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    OpenAi,
    OpenRouter,
    Ollama,
}

pub struct OpenAiProvider {
    pub base_url: String,
    pub api_style: ApiStyle,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    fn with_style(base_url: Option<&str>, default: &str, style: ApiStyle, id: &str) -> Self {
        Self {
            base_url: base_url.unwrap_or(default).trim_end_matches('/').to_string(),
            api_style: style,
            provider_id: id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENAI_BASE_URL, ApiStyle::OpenAi, "openai")
    }

    pub fn openrouter(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OPENROUTER_BASE_URL, ApiStyle::OpenRouter, "openrouter")
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::with_style(base_url, OLLAMA_BASE_URL, ApiStyle::Ollama, "ollama")
    }

    /// Pick the constructor matching a configured provider id. Unknown ids are
    /// treated as OpenAI-compatible endpoints.
    pub fn for_provider(id: &str, base_url: Option<&str>) -> Self {
        match id {
            "openrouter" => Self::openrouter(base_url),
            "ollama" => Self::ollama(base_url),
            "openai" => Self::openai(base_url),
            other => Self::with_style(base_url, OPENAI_BASE_URL, ApiStyle::OpenAi, other),
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Wrap tool definitions in OpenAI's `function` envelope.
pub fn format_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                }
            })
        })
        .collect()
}

/// Convert conversation messages to the chat completions wire format.
pub fn format_messages(messages: &[ConversationMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            let mut out = json!({ "role": msg.role.as_str() });
            match (&msg.content, msg.tool_calls.is_empty()) {
                // Assistant turns that only call tools carry null content.
                (content, false) if content.is_empty() => out["content"] = serde_json::Value::Null,
                (MessageContent::Text(text), _) => out["content"] = json!(text),
                (MessageContent::Parts(parts), _) => out["content"] = json!(parts),
            }
            if msg.role != Role::Tool {
                if let Some(name) = &msg.name {
                    out["name"] = json!(name);
                }
            }
            if !msg.tool_calls.is_empty() {
                out["tool_calls"] = json!(msg.tool_calls);
            }
            if let Some(id) = &msg.tool_call_id {
                out["tool_call_id"] = json!(id);
            }
            out
        })
        .collect()
}

/// Map one decoded SSE payload to a completion chunk. `None` for payloads that
/// carry nothing (role-only deltas, empty choices).
fn convert_chunk(chunk: ChatCompletionChunk) -> Option<CompletionChunk> {
    let usage = chunk.usage.map(|u| ChunkUsage {
        input_tokens: Some(u.prompt_tokens),
        output_tokens: Some(u.completion_tokens),
    });

    let mut out = CompletionChunk {
        usage,
        ..CompletionChunk::default()
    };

    if let Some(choice) = chunk.choices.into_iter().next() {
        out.delta = choice.delta.content.filter(|c| !c.is_empty());
        out.tool_calls = choice
            .delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let function = tc.function.unwrap_or_default();
                ToolCallFragment {
                    index: tc.index,
                    call_id: tc.id,
                    name: function.name,
                    arguments_delta: function.arguments.unwrap_or_default(),
                }
            })
            .collect();
        out.stop_reason = choice.finish_reason;
    }

    let empty = out.delta.is_none()
        && out.tool_calls.is_empty()
        && out.usage.is_none()
        && out.stop_reason.is_none();
    (!empty).then_some(out)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<ChunkStream> {
        let api_key = match credentials {
            Credentials::ApiKey { api_key } => Some(api_key.clone()),
            Credentials::None if self.api_style == ApiStyle::Ollama => None,
            Credentials::None => {
                anyhow::bail!("{} requires ApiKey credentials", self.provider_id)
            }
        };

        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(format_messages(&request.messages));

        let tools = (!request.tools.is_empty()).then(|| format_tools(&request.tools));

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            stream: true,
            temperature: request.temperature,
            tools,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        debug!(model = %body.model, base_url = %self.base_url, "Streaming OpenAI-compatible API");

        let mut req_builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");

        if let Some(key) = api_key.filter(|_| self.api_style != ApiStyle::Ollama) {
            req_builder = req_builder.header("authorization", format!("Bearer {key}"));
        }

        let response = req_builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        let chunks = parse_sse_stream(response)
            // OpenAI terminates with "data: [DONE]"
            .take_while(|event| {
                !matches!(event, Ok(e) if e.data.trim() == "[DONE]")
            })
            .filter_map(|event| match event {
                Ok(event) => match serde_json::from_str::<ChatCompletionChunk>(event.data.trim()) {
                    Ok(chunk) => convert_chunk(chunk).map(Ok),
                    Err(e) => {
                        trace!(%e, data = %event.data, "Failed to parse OpenAI chunk");
                        None
                    }
                },
                Err(e) => Some(Err(e)),
            });

        Ok(Box::pin(chunks))
    }
}
