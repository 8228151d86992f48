//! OpenRouter-backed [`CompletionProvider`] using the `genai` client.
//!
//! All catalog models are routed through OpenRouter's OpenAI-compatible API,
//! so the client is built with a service-target resolver that pins the
//! endpoint and adapter regardless of the model id's vendor prefix.

use async_trait::async_trait;
use futures::StreamExt;
use genai::adapter::AdapterKind;
use genai::chat::{
    ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent, ContentPart,
    ReasoningEffort as GenAiReasoningEffort,
};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use tracing::debug;

use super::{
    CompletionProvider, ProviderError, ProviderEvent, ProviderMessage, ProviderRequest,
    ProviderRole, ProviderStream, ReasoningEffort,
};

const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/";

/// Completion provider speaking to OpenRouter.
pub struct OpenRouterProvider {
    client: Client,
    default_api_key: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(default_api_key: Option<String>) -> Self {
        Self {
            client: build_client(default_api_key.clone()),
            default_api_key,
        }
    }

    /// The shared client, or a one-off client when the request carries its
    /// own credential.
    fn client_for(&self, api_key_override: Option<&str>) -> Client {
        match api_key_override {
            Some(key) => build_client(Some(key.to_owned())),
            None => self.client.clone(),
        }
    }
}

fn build_client(api_key: Option<String>) -> Client {
    let target_resolver = ServiceTargetResolver::from_resolver_fn(
        move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
            let ServiceTarget { model, .. } = service_target;
            let endpoint = Endpoint::from_static(OPENROUTER_ENDPOINT);
            let auth = match &api_key {
                Some(key) => AuthData::from_single(key.clone()),
                None => AuthData::from_env("OPENROUTER_API_KEY"),
            };
            let model = ModelIden::new(AdapterKind::OpenAI, model.model_name);
            Ok(ServiceTarget {
                endpoint,
                auth,
                model,
            })
        },
    );

    Client::builder()
        .with_service_target_resolver(target_resolver)
        .build()
}

fn to_chat_messages(messages: &[ProviderMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| match m.role {
            ProviderRole::System => ChatMessage::system(m.text.clone()),
            ProviderRole::Assistant => ChatMessage::assistant(m.text.clone()),
            ProviderRole::User => {
                if m.images.is_empty() {
                    ChatMessage::user(m.text.clone())
                } else {
                    let mut parts = vec![ContentPart::from_text(m.text.clone())];
                    for url in &m.images {
                        parts.push(ContentPart::from_binary_url("image/png", url.clone(), None));
                    }
                    ChatMessage::user(parts)
                }
            }
        })
        .collect()
}

fn to_genai_effort(effort: ReasoningEffort) -> GenAiReasoningEffort {
    match effort {
        ReasoningEffort::Low => GenAiReasoningEffort::Low,
        ReasoningEffort::Medium => GenAiReasoningEffort::Medium,
        ReasoningEffort::High => GenAiReasoningEffort::High,
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    async fn stream_chat(&self, req: ProviderRequest) -> Result<ProviderStream, ProviderError> {
        let client = self.client_for(req.api_key.as_deref());
        let chat_req = ChatRequest::new(to_chat_messages(&req.messages));

        let mut options = ChatOptions::default();
        if let Some(effort) = req.reasoning_effort {
            options = options.with_reasoning_effort(to_genai_effort(effort));
        }

        debug!(model = %req.model, turns = req.messages.len(), "starting provider stream");
        let response = client
            .exec_chat_stream(&req.model, chat_req, Some(&options))
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let events = response
            .stream
            .filter_map(|event| async move {
                match event {
                    Ok(ChatStreamEvent::Chunk(chunk)) => {
                        Some(Ok(ProviderEvent::TextDelta(chunk.content)))
                    }
                    Ok(ChatStreamEvent::ReasoningChunk(chunk)) => {
                        Some(Ok(ProviderEvent::ReasoningDelta(chunk.content)))
                    }
                    Ok(ChatStreamEvent::Start)
                    | Ok(ChatStreamEvent::End(_))
                    | Ok(ChatStreamEvent::ToolCallChunk(_))
                    | Ok(ChatStreamEvent::ThoughtSignatureChunk(_)) => None,
                    Err(e) => Some(Err(ProviderError::Stream(e.to_string()))),
                }
            })
            .boxed();

        Ok(events)
    }

    async fn generate_title(
        &self,
        model: &str,
        user_text: &str,
    ) -> Result<String, ProviderError> {
        let prompt = format!(
            "Generate a descriptive title for the following text. 2-3 words max.\nText: {user_text}"
        );
        let chat_req = ChatRequest::new(vec![ChatMessage::user(prompt)]);

        let response = self
            .client
            .exec_chat(model, chat_req, None)
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        response
            .content_text_as_str()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty title completion".into()))
    }
}

impl std::fmt::Debug for OpenRouterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterProvider")
            .field("has_default_key", &self.default_api_key.is_some())
            .finish()
    }
}
