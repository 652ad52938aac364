//! Provider integration tests against real API calls.
//!
//! These tests are skipped when the corresponding API key env var is not set.
//! Run with: `cargo test -p easel-providers --test integration`

use easel_core::types::ConversationMessage;
use easel_providers::openai::OpenAiProvider;
use easel_providers::{CompletionRequest, Credentials, LlmProvider, ToolDefinition};
use tokio_stream::StreamExt;

fn openai_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

fn request(messages: Vec<ConversationMessage>, tools: Vec<ToolDefinition>) -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o-mini".into(),
        messages,
        max_tokens: 100,
        temperature: Some(0.0),
        tools,
        system: Some("You are a helpful assistant. Follow instructions exactly.".into()),
    }
}

#[tokio::test]
async fn test_openai_streaming() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };

    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };
    let req = request(
        vec![ConversationMessage::user("Reply with exactly the word 'hello'.")],
        Vec::new(),
    );

    let mut stream = provider.stream(&req, &credentials).await.unwrap();
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if let Some(delta) = chunk.expect("Stream chunk error").delta {
            text.push_str(&delta);
        }
    }

    assert!(
        text.to_lowercase().contains("hello"),
        "Expected 'hello' in response, got: {text}"
    );
}

#[tokio::test]
async fn test_openai_tool_call_fragments() {
    let Some(api_key) = openai_key() else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };

    let provider = OpenAiProvider::openai(None);
    let credentials = Credentials::ApiKey { api_key };
    let tool = ToolDefinition {
        name: "generate_image".into(),
        description: "Generate an image from a prompt".into(),
        parameters_schema: serde_json::json!({
            "type": "object",
            "properties": { "prompt": { "type": "string" } },
            "required": ["prompt"],
        }),
    };
    let req = request(
        vec![ConversationMessage::user(
            "Call generate_image with the prompt 'red dragon'.",
        )],
        vec![tool],
    );

    let mut stream = provider.stream(&req, &credentials).await.unwrap();
    let mut name = None;
    let mut arguments = String::new();
    while let Some(chunk) = stream.next().await {
        for fragment in chunk.expect("Stream chunk error").tool_calls {
            if fragment.index == 0 {
                if fragment.name.is_some() {
                    name = fragment.name;
                }
                arguments.push_str(&fragment.arguments_delta);
            }
        }
    }

    assert_eq!(name.as_deref(), Some("generate_image"));
    let parsed: serde_json::Value = serde_json::from_str(&arguments).unwrap();
    assert!(parsed["prompt"].is_string());
}
