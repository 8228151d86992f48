//! Generation pipeline: one chat turn from request to persisted message.
//!
//! [`start_turn`] validates the request, registers the stream id, persists
//! the user message, and spawns a *detached* producer task that drives the
//! completion provider into the broker.  Detachment is a hard guarantee: the
//! producer's lifetime is tied to nothing but itself, so a client that
//! disconnects mid-generation never cancels the turn — the assistant message
//! is still persisted and a later resume finds the finished stream.
//!
//! Persistence of the assistant message happens exactly once, after the
//! provider signals completion.  A reader that only ever sees the store
//! observes a complete message or none at all, never a partial one.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;
use zylu_stream::{StreamBroker, StreamReader, StreamWriter};

use crate::catalog;
use crate::entities::{
    ChatRecord, ChatStore, MessagePart, MessageRecord, MessageStore, Role, SqliteStore,
    StreamRegistry,
};
use crate::error::ServerError;
use crate::provider::{
    CompletionProvider, ProviderEvent, ProviderMessage, ProviderRequest, ProviderRole,
    ProviderStream, ReasoningEffort,
};
use crate::schemas::v1::chat::{ReasoningEffortArg, StreamEvent, TurnRequest};

/// Maximum allowed prompt length in bytes to prevent memory exhaustion.
const MAX_PROMPT_BYTES: usize = 128 * 1024; // 128 KiB

const BASE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that can answer questions and help with tasks.";

/// Fallback title length when title generation fails.
const TITLE_FALLBACK_CHARS: usize = 40;

/// Start one generation turn and return the caller's reader.
///
/// Side-effect order is deliberate: the registry append happens before the
/// first provider token is requested, so a resume racing this call can always
/// find the stream id even when no chunk has been written yet.
pub async fn start_turn(
    store: Arc<SqliteStore>,
    broker: StreamBroker,
    provider: Arc<dyn CompletionProvider>,
    title_model: String,
    user_id: &str,
    req: TurnRequest,
) -> Result<StreamReader, ServerError> {
    let model = catalog::find(&req.model)
        .ok_or_else(|| ServerError::ProviderNotFound(req.model.clone()))?;

    let user_message = req
        .messages
        .last()
        .filter(|m| m.role == "user")
        .ok_or_else(|| ServerError::BadRequest("last message must be a user message".into()))?
        .clone();

    if user_message.content.len() > MAX_PROMPT_BYTES {
        return Err(ServerError::BadRequest(format!(
            "prompt too large ({} bytes); maximum is {} bytes",
            user_message.content.len(),
            MAX_PROMPT_BYTES,
        )));
    }

    let provider_messages = build_provider_messages(&req)?;

    // Lazy chat creation on the first message of a conversation.
    if store.get_chat(&req.chat_id).await?.is_none() {
        let title = match provider
            .generate_title(&title_model, &user_message.content)
            .await
        {
            Ok(title) => title,
            Err(e) => {
                warn!(chat_id = %req.chat_id, error = %e, "title generation failed; using prompt prefix");
                fallback_title(&user_message.content)
            }
        };
        store
            .insert_chat(ChatRecord {
                id: req.chat_id.clone(),
                user_id: user_id.to_owned(),
                title,
                created_at: Utc::now(),
            })
            .await?;
    }

    let stream_id = Uuid::new_v4().simple().to_string();

    // Registry append precedes any provider work.
    store.append_stream(&req.chat_id, &stream_id).await?;

    // The user message is persisted best-effort: a failure here is logged
    // but must not abort a turn whose stream id is already registered.
    let user_record = MessageRecord {
        id: Uuid::new_v4().to_string(),
        chat_id: req.chat_id.clone(),
        user_id: user_id.to_owned(),
        role: Role::User,
        parts: user_parts(&user_message),
        model: req.model.clone(),
        created_at: Utc::now(),
    };
    if let Err(e) = store.append_message(user_record).await {
        warn!(chat_id = %req.chat_id, error = %e, "failed to persist user message");
    }

    let writer = broker
        .open(&stream_id)
        .map_err(|e| ServerError::Internal(format!("broker rejected fresh stream id: {e}")))?;
    let reader = broker
        .attach(&stream_id)
        .ok_or_else(|| ServerError::Internal("stream vanished before attach".into()))?;

    let provider_model = if req.options.web_search {
        format!("{}:online", req.model)
    } else {
        req.model.clone()
    };
    let reasoning_effort = if model.capabilities.supports_reasoning {
        req.options.reasoning_effort.map(|e| match e {
            ReasoningEffortArg::Low => ReasoningEffort::Low,
            ReasoningEffortArg::Medium => ReasoningEffort::Medium,
            ReasoningEffortArg::High => ReasoningEffort::High,
        })
    } else {
        None
    };

    // A refusal at request time still happens before the first response byte,
    // so it can surface as an HTTP error (502); failures after this point are
    // encoded as stream events instead.  The writer drops (and closes) here
    // on the error path, so a racing resume finds an empty terminal stream.
    let provider_stream = provider
        .stream_chat(ProviderRequest {
            model: provider_model,
            messages: provider_messages,
            reasoning_effort,
            api_key: req.api_key,
        })
        .await?;

    let producer = Producer {
        store,
        writer,
        chat_id: req.chat_id,
        user_id: user_id.to_owned(),
        catalog_model: req.model,
        supports_reasoning: model.capabilities.supports_reasoning,
        stream_id,
    };

    // Detached: deliberately not awaited and not tied to the HTTP connection.
    tokio::spawn(producer.run(provider_stream));

    Ok(reader)
}

fn build_provider_messages(req: &TurnRequest) -> Result<Vec<ProviderMessage>, ServerError> {
    let system_text = match &req.system_prompt {
        Some(custom) if !custom.trim().is_empty() => {
            format!("{}. {}", custom.trim(), BASE_SYSTEM_PROMPT)
        }
        _ => BASE_SYSTEM_PROMPT.to_owned(),
    };

    let mut messages = vec![ProviderMessage {
        role: ProviderRole::System,
        text: system_text,
        images: Vec::new(),
    }];

    for m in &req.messages {
        let role = match m.role.as_str() {
            "system" => ProviderRole::System,
            "user" => ProviderRole::User,
            "assistant" => ProviderRole::Assistant,
            other => {
                return Err(ServerError::BadRequest(format!(
                    "unknown message role: {other}"
                )))
            }
        };
        messages.push(ProviderMessage {
            role,
            text: m.content.clone(),
            images: m.attachments.iter().map(|a| a.url.clone()).collect(),
        });
    }
    Ok(messages)
}

fn user_parts(message: &crate::schemas::v1::chat::TurnMessage) -> Vec<MessagePart> {
    let mut parts = vec![MessagePart::Text {
        text: message.content.clone(),
    }];
    for attachment in &message.attachments {
        parts.push(MessagePart::Image {
            image: attachment.url.clone(),
        });
    }
    parts
}

fn fallback_title(user_text: &str) -> String {
    let mut title: String = user_text.chars().take(TITLE_FALLBACK_CHARS).collect();
    if user_text.chars().count() > TITLE_FALLBACK_CHARS {
        title.push('…');
    }
    title
}

/// The detached producer for one generation turn.
struct Producer {
    store: Arc<SqliteStore>,
    writer: StreamWriter,
    chat_id: String,
    user_id: String,
    /// Catalog id recorded on the persisted message (no web-search suffix).
    catalog_model: String,
    supports_reasoning: bool,
    stream_id: String,
}

impl Producer {
    async fn run(mut self, mut stream: ProviderStream) {
        let mut text = String::new();
        let mut reasoning = String::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ProviderEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    self.emit(&StreamEvent::TextDelta { delta });
                }
                Ok(ProviderEvent::ReasoningDelta(delta)) => {
                    reasoning.push_str(&delta);
                    self.emit(&StreamEvent::ReasoningDelta { delta });
                }
                Err(e) => {
                    // Mid-stream failure: close without persisting anything,
                    // so the store never shows a partial assistant message.
                    error!(chat_id = %self.chat_id, stream_id = %self.stream_id, error = %e, "provider stream failed");
                    self.emit(&StreamEvent::Error {
                        message: e.to_string(),
                    });
                    self.writer.close();
                    return;
                }
            }
        }

        let mut parts = Vec::new();
        if self.supports_reasoning && !reasoning.is_empty() {
            parts.push(MessagePart::Reasoning { reasoning });
        }
        parts.push(MessagePart::Text { text });

        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            chat_id: self.chat_id.clone(),
            user_id: self.user_id.clone(),
            role: Role::Assistant,
            parts,
            model: self.catalog_model.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_message(record).await {
            error!(chat_id = %self.chat_id, stream_id = %self.stream_id, error = %e, "failed to persist assistant message");
        } else {
            info!(chat_id = %self.chat_id, stream_id = %self.stream_id, "turn complete");
        }

        self.emit(&StreamEvent::Finish);
        self.writer.close();
    }

    fn emit(&self, event: &StreamEvent) {
        if let Err(e) = self.writer.write(event.encode()) {
            warn!(stream_id = %self.stream_id, error = %e, "dropping event for closed stream");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;

    use crate::provider::{ProviderError, ProviderStream};

    /// Scripted provider: replays a fixed event sequence per call.
    pub struct MockProvider {
        pub events: Vec<Result<ProviderEvent, ProviderError>>,
        pub fail_request: bool,
    }

    impl MockProvider {
        pub fn with_events(events: Vec<Result<ProviderEvent, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                events,
                fail_request: false,
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        async fn stream_chat(
            &self,
            _req: ProviderRequest,
        ) -> Result<ProviderStream, ProviderError> {
            if self.fail_request {
                return Err(ProviderError::Request("mock refused".into()));
            }
            Ok(futures::stream::iter(self.events.clone()).boxed())
        }

        async fn generate_title(
            &self,
            _model: &str,
            _user_text: &str,
        ) -> Result<String, ProviderError> {
            Ok("Mock Title".into())
        }
    }

    pub fn turn_request(chat_id: &str, model: &str, content: &str) -> TurnRequest {
        TurnRequest {
            chat_id: chat_id.into(),
            model: model.into(),
            options: Default::default(),
            messages: vec![crate::schemas::v1::chat::TurnMessage {
                role: "user".into(),
                content: content.into(),
                attachments: Vec::new(),
            }],
            system_prompt: None,
            api_key: None,
        }
    }

    pub async fn collect_events(mut reader: StreamReader) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(chunk) = reader.next().await {
            events.push(StreamEvent::decode(&chunk).expect("valid event"));
        }
        events
    }
}

#[cfg(test)]
mod test {
    use super::testing::{collect_events, turn_request, MockProvider};
    use super::*;
    use zylu_stream::BrokerConfig;

    use crate::provider::ProviderError;

    async fn memory_store() -> Arc<SqliteStore> {
        Arc::new(
            SqliteStore::connect("sqlite::memory:")
                .await
                .expect("in-memory store"),
        )
    }

    fn broker() -> StreamBroker {
        StreamBroker::new(BrokerConfig::default())
    }

    #[tokio::test]
    async fn unknown_model_fails_before_any_write() {
        let store = memory_store().await;
        let provider = MockProvider::with_events(vec![]);

        let err = start_turn(
            Arc::clone(&store),
            broker(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c1", "acme/imaginary-model", "hi"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::ProviderNotFound(_)));
        assert!(store.latest_stream("c1").await.unwrap().is_none());
        assert!(store.list_messages("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_message_must_be_from_the_user() {
        let store = memory_store().await;
        let provider = MockProvider::with_events(vec![]);
        let mut req = turn_request("c1", "openai/gpt-4.1-nano", "hi");
        req.messages[0].role = "assistant".into();

        let err = start_turn(store, broker(), provider, "t".into(), "u1", req)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn successful_turn_streams_and_persists_exactly_one_assistant_message() {
        let store = memory_store().await;
        let broker = broker();
        let provider = MockProvider::with_events(vec![Ok(ProviderEvent::TextDelta("4".into()))]);

        let reader = start_turn(
            Arc::clone(&store),
            broker.clone(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c2", "openai/gpt-4.1-nano", "2+2?"),
        )
        .await
        .unwrap();

        let events = collect_events(reader).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta { delta: "4".into() },
                StreamEvent::Finish,
            ]
        );

        // The chat was created lazily with the provider-generated title.
        let chat = store.get_chat("c2").await.unwrap().unwrap();
        assert_eq!(chat.title, "Mock Title");

        // Registry has exactly the one attempt.
        assert!(store.latest_stream("c2").await.unwrap().is_some());

        // Exactly one user and one assistant message, in order.
        let messages = store.list_messages("c2").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(
            messages[1].parts,
            vec![MessagePart::Text { text: "4".into() }]
        );
    }

    #[tokio::test]
    async fn reasoning_models_persist_reasoning_before_text() {
        let store = memory_store().await;
        let provider = MockProvider::with_events(vec![
            Ok(ProviderEvent::ReasoningDelta("two plus ".into())),
            Ok(ProviderEvent::ReasoningDelta("two".into())),
            Ok(ProviderEvent::TextDelta("4".into())),
        ]);

        let reader = start_turn(
            Arc::clone(&store),
            broker(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c1", "deepseek/deepseek-r1-0528", "2+2?"),
        )
        .await
        .unwrap();
        let events = collect_events(reader).await;

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], StreamEvent::ReasoningDelta { .. }));
        assert!(matches!(events[2], StreamEvent::TextDelta { .. }));

        let last = store.latest_message("c1").await.unwrap().unwrap();
        assert_eq!(
            last.parts,
            vec![
                MessagePart::Reasoning {
                    reasoning: "two plus two".into()
                },
                MessagePart::Text { text: "4".into() },
            ]
        );
    }

    #[tokio::test]
    async fn provider_failure_closes_stream_without_persisting() {
        let store = memory_store().await;
        let provider = MockProvider::with_events(vec![
            Ok(ProviderEvent::TextDelta("Thinking...".into())),
            Err(ProviderError::Stream("upstream hiccup".into())),
        ]);

        let reader = start_turn(
            Arc::clone(&store),
            broker(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c3", "openai/gpt-4.1-nano", "hello?"),
        )
        .await
        .unwrap();
        let events = collect_events(reader).await;

        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { .. })
        ));

        // Only the user message exists; no partial assistant message.
        let messages = store.list_messages("c3").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn request_refusal_maps_to_an_http_provider_error() {
        let store = memory_store().await;
        let broker = broker();
        let provider = Arc::new(MockProvider {
            events: vec![],
            fail_request: true,
        });

        let err = start_turn(
            Arc::clone(&store),
            broker.clone(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c1", "openai/gpt-4.1-nano", "hi"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Provider(_)));

        // The registry entry exists (appended before the provider was asked
        // for anything) and the abandoned stream is closed, so a resume sees
        // an empty terminal stream rather than hanging.
        let stream_id = store.latest_stream("c1").await.unwrap().unwrap();
        let reader = broker.attach(&stream_id).unwrap();
        assert!(collect_events(reader).await.is_empty());
    }

    #[tokio::test]
    async fn second_reader_attached_mid_stream_sees_the_same_sequence() {
        let store = memory_store().await;
        let broker = broker();
        let provider = MockProvider::with_events(vec![
            Ok(ProviderEvent::TextDelta("a".into())),
            Ok(ProviderEvent::TextDelta("b".into())),
        ]);

        let first = start_turn(
            Arc::clone(&store),
            broker.clone(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c2", "openai/gpt-4.1-nano", "hi"),
        )
        .await
        .unwrap();

        let stream_id = store.latest_stream("c2").await.unwrap().unwrap();
        let second = broker.attach(&stream_id).unwrap();

        assert_eq!(collect_events(first).await, collect_events(second).await);
    }

    #[tokio::test]
    async fn existing_chat_skips_title_generation() {
        let store = memory_store().await;
        store
            .insert_chat(ChatRecord {
                id: "c1".into(),
                user_id: "u1".into(),
                title: "Existing".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let provider = MockProvider::with_events(vec![Ok(ProviderEvent::TextDelta("ok".into()))]);

        let reader = start_turn(
            Arc::clone(&store),
            broker(),
            provider,
            "title-model".into(),
            "u1",
            turn_request("c1", "openai/gpt-4.1-nano", "hi"),
        )
        .await
        .unwrap();
        collect_events(reader).await;

        assert_eq!(store.get_chat("c1").await.unwrap().unwrap().title, "Existing");
    }

    #[test]
    fn fallback_title_truncates_on_char_boundaries() {
        let short = fallback_title("hello");
        assert_eq!(short, "hello");

        let long = fallback_title(&"é".repeat(100));
        assert_eq!(long.chars().count(), TITLE_FALLBACK_CHARS + 1);
        assert!(long.ends_with('…'));
    }
}
