//! Raw runner events to canonical client events.
//!
//! The translator keeps the running transcript, persists every message past
//! its high-water mark exactly once, and tracks tool calls by fragment index
//! so argument fragments can be addressed to the call they belong to. The
//! translated stream always ends with exactly one `done` or `error`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, error, trace};

use easel_core::ClientEvent;
use easel_core::store::PersistenceGateway;
use easel_core::types::{ConversationMessage, ToolCallFragment};

use crate::{MessageDelta, RawEvent, RawEventStream};

/// A tool call announced to the client, addressable by fragment index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub index: usize,
}

pub struct Translator {
    session_id: String,
    gateway: Arc<dyn PersistenceGateway>,
    transcript: Vec<ConversationMessage>,
    /// Number of transcript messages known to be persisted.
    persisted: usize,
    pending: HashMap<usize, PendingToolCall>,
    announced: HashSet<String>,
}

impl Translator {
    /// `history` is the turn's input, already durable.
    pub fn new(
        session_id: impl Into<String>,
        gateway: Arc<dyn PersistenceGateway>,
        history: Vec<ConversationMessage>,
    ) -> Self {
        let persisted = history.len();
        Self {
            session_id: session_id.into(),
            gateway,
            transcript: history,
            persisted,
            pending: HashMap::new(),
            announced: HashSet::new(),
        }
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    pub fn persisted(&self) -> usize {
        self.persisted
    }

    pub fn pending(&self, index: usize) -> Option<&PendingToolCall> {
        self.pending.get(&index)
    }

    /// Translate one raw event. Errors come from persistence.
    pub async fn handle(&mut self, event: RawEvent) -> anyhow::Result<Vec<ClientEvent>> {
        match event {
            RawEvent::Update { messages } => {
                self.transcript.extend(messages);
                self.sync().await
            }
            RawEvent::Snapshot { messages } => {
                self.transcript = messages;
                self.sync().await
            }
            RawEvent::Delta(delta) => Ok(self.delta(delta)),
        }
    }

    /// Persist what is new and announce the transcript.
    async fn sync(&mut self) -> anyhow::Result<Vec<ClientEvent>> {
        let start = self.persisted.min(self.transcript.len());
        for message in &self.transcript[start..] {
            let serialized = serde_json::to_string(message)?;
            self.gateway
                .create_message(&self.session_id, message.role.as_str(), &serialized)
                .await?;
        }
        if self.transcript.len() > start {
            debug!(session_id = %self.session_id, count = self.transcript.len() - start, "Persisted messages");
        }
        self.persisted = self.persisted.max(self.transcript.len());

        Ok(vec![ClientEvent::AllMessages {
            messages: self.transcript.clone(),
        }])
    }

    fn delta(&mut self, delta: MessageDelta) -> Vec<ClientEvent> {
        if delta.is_tool_result {
            trace!(content = ?delta.content, "Tool result chunk");
            return Vec::new();
        }
        if delta.is_empty() {
            trace!("Empty delta dropped");
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(ClientEvent::Delta { text });
        }
        for fragment in delta.tool_calls {
            self.fragment(fragment, &mut events);
        }
        events
    }

    fn fragment(&mut self, fragment: ToolCallFragment, events: &mut Vec<ClientEvent>) {
        if fragment.is_named() {
            let Some(call_id) = fragment.call_id.clone().filter(|id| !id.is_empty()) else {
                debug!(index = fragment.index, "Named fragment without call id dropped");
                return;
            };
            let name = fragment.name.clone().unwrap_or_default();
            self.pending.insert(
                fragment.index,
                PendingToolCall {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    index: fragment.index,
                },
            );
            if self.announced.insert(call_id.clone()) {
                events.push(ClientEvent::tool_call(call_id, name));
            }
        }

        if fragment.arguments_delta.is_empty() {
            return;
        }
        match self.pending.get(&fragment.index) {
            Some(call) => events.push(ClientEvent::ToolCallArguments {
                id: call.call_id.clone(),
                text: fragment.arguments_delta,
            }),
            None => debug!(index = fragment.index, "Argument fragment for unknown call dropped"),
        }
    }

    /// Translate a whole raw stream. A runner error or a persistence failure
    /// ends the stream with `error`; otherwise it ends with `done`.
    pub fn translate(self, mut raw: RawEventStream) -> impl Stream<Item = ClientEvent> + Send {
        let mut translator = self;
        stream! {
            while let Some(item) = raw.next().await {
                let translated = match item {
                    Ok(event) => translator.handle(event).await,
                    Err(e) => Err(e),
                };
                match translated {
                    Ok(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    Err(e) => {
                        error!(session_id = %translator.session_id, error = %e, "Turn failed");
                        yield ClientEvent::error(e.to_string());
                        return;
                    }
                }
            }
            debug!(session_id = %translator.session_id, "Turn complete");
            yield ClientEvent::Done;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryGateway, fragment, named};
    use serde_json::json;

    fn translator(gateway: Arc<MemoryGateway>, history: Vec<ConversationMessage>) -> Translator {
        Translator::new("s1", gateway, history)
    }

    #[tokio::test]
    async fn test_text_delta() {
        let mut t = translator(Arc::default(), vec![]);
        let events = t.handle(RawEvent::Delta(MessageDelta::text("Hel"))).await.unwrap();
        assert_eq!(events, vec![ClientEvent::Delta { text: "Hel".into() }]);
    }

    #[tokio::test]
    async fn test_tool_call_announced_once() {
        let mut t = translator(Arc::default(), vec![]);
        let first = t
            .handle(RawEvent::Delta(MessageDelta::fragments(vec![named(0, "call_1", "generate_image")])))
            .await
            .unwrap();
        assert_eq!(first, vec![ClientEvent::tool_call("call_1", "generate_image")]);
        assert_eq!(t.pending(0).unwrap().name, "generate_image");

        let repeat = t
            .handle(RawEvent::Delta(MessageDelta::fragments(vec![named(0, "call_1", "generate_image")])))
            .await
            .unwrap();
        assert!(repeat.is_empty());
    }

    #[tokio::test]
    async fn test_argument_fragments_reconstruct_payload() {
        let mut t = translator(Arc::default(), vec![]);
        let raw = vec![
            named(0, "call_a", "generate_image"),
            named(1, "call_b", "write_plan"),
            fragment(0, "{\"prompt\": \"a red"),
            fragment(1, "{\"steps\": []"),
            fragment(0, " dragon\", \"aspect_ratio\": \"1:1\"}"),
            fragment(1, "}"),
        ];
        let mut events = Vec::new();
        for f in raw {
            events.extend(t.handle(RawEvent::Delta(MessageDelta::fragments(vec![f]))).await.unwrap());
        }

        let args_for = |id: &str| -> String {
            events
                .iter()
                .filter_map(|e| match e {
                    ClientEvent::ToolCallArguments { id: eid, text } if eid == id => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        };
        let a: serde_json::Value = serde_json::from_str(&args_for("call_a")).unwrap();
        assert_eq!(a, json!({"prompt": "a red dragon", "aspect_ratio": "1:1"}));
        let b: serde_json::Value = serde_json::from_str(&args_for("call_b")).unwrap();
        assert_eq!(b, json!({"steps": []}));
    }

    #[tokio::test]
    async fn test_named_fragment_with_arguments_emits_both() {
        let mut t = translator(Arc::default(), vec![]);
        let mut whole = named(0, "call_1", "write_plan");
        whole.arguments_delta = "{\"steps\":[]}".into();
        let events = t.handle(RawEvent::Delta(MessageDelta::fragments(vec![whole]))).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], ClientEvent::ToolCallArguments { text, .. } if text == "{\"steps\":[]}"));
    }

    #[tokio::test]
    async fn test_anomalies_dropped() {
        let mut t = translator(Arc::default(), vec![]);
        assert!(t.handle(RawEvent::Delta(MessageDelta::default())).await.unwrap().is_empty());
        assert!(
            t.handle(RawEvent::Delta(MessageDelta::tool_result("Plan written")))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            t.handle(RawEvent::Delta(MessageDelta::fragments(vec![fragment(4, "{}")])))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_appends_and_persists_new_messages() {
        let gateway = Arc::new(MemoryGateway::default());
        let history = vec![ConversationMessage::user("draw a cat")];
        let mut t = translator(gateway.clone(), history);

        let events = t
            .handle(RawEvent::Update {
                messages: vec![ConversationMessage::assistant("Sure.")],
            })
            .await
            .unwrap();
        let ClientEvent::AllMessages { messages } = &events[0] else {
            panic!("expected all_messages");
        };
        assert_eq!(messages.len(), 2);

        let persisted = gateway.persisted();
        assert_eq!(persisted, vec![json!({"role": "assistant", "content": "Sure."})]);
        assert_eq!(gateway.messages.lock().unwrap()[0].1, "assistant");
        assert_eq!(t.persisted(), 2);
    }

    #[tokio::test]
    async fn test_snapshots_persist_past_high_water_mark_only() {
        let gateway = Arc::new(MemoryGateway::default());
        let user = ConversationMessage::user("draw");
        let plan = ConversationMessage::assistant("planning").with_name("planner");
        let done = ConversationMessage::assistant("drawn").with_name("image_designer");
        let mut t = translator(gateway.clone(), vec![user.clone()]);

        t.handle(RawEvent::Snapshot { messages: vec![user.clone(), plan.clone()] })
            .await
            .unwrap();
        t.handle(RawEvent::Snapshot { messages: vec![user.clone(), plan.clone()] })
            .await
            .unwrap();
        t.handle(RawEvent::Snapshot { messages: vec![user, plan, done] })
            .await
            .unwrap();

        let persisted = gateway.persisted();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0]["name"], "planner");
        assert_eq!(persisted[1]["name"], "image_designer");
    }

    #[tokio::test]
    async fn test_stream_ends_with_single_done() {
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![
            Ok(RawEvent::Delta(MessageDelta::text("hi"))),
            Ok(RawEvent::Update { messages: vec![ConversationMessage::assistant("hi")] }),
        ]));
        let events: Vec<ClientEvent> = translator(Arc::default(), vec![]).translate(raw).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events.last(), Some(&ClientEvent::Done));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_runner_error_is_last_event() {
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![
            Ok(RawEvent::Delta(MessageDelta::text("partial"))),
            Err(anyhow::anyhow!("connection reset")),
            Ok(RawEvent::Delta(MessageDelta::text("never"))),
        ]));
        let events: Vec<ClientEvent> = translator(Arc::default(), vec![]).translate(raw).collect().await;
        assert_eq!(
            events,
            vec![
                ClientEvent::Delta { text: "partial".into() },
                ClientEvent::error("connection reset"),
            ]
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_turn() {
        let raw: RawEventStream = Box::pin(futures::stream::iter(vec![Ok(RawEvent::Update {
            messages: vec![ConversationMessage::assistant("hi")],
        })]));
        let events: Vec<ClientEvent> = translator(Arc::new(MemoryGateway::failing()), vec![])
            .translate(raw)
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ClientEvent::Error { error } if error.contains("disk full")));
    }

    #[tokio::test]
    async fn test_empty_stream_is_done() {
        let raw: RawEventStream = Box::pin(futures::stream::empty());
        let events: Vec<ClientEvent> = translator(Arc::default(), vec![]).translate(raw).collect().await;
        assert_eq!(events, vec![ClientEvent::Done]);
    }
}
