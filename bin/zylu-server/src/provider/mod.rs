//! External completion-provider abstraction.
//!
//! The generation pipeline only speaks [`CompletionProvider`]; the live
//! implementation is [`openrouter::OpenRouterProvider`] (via the `genai`
//! client), and tests substitute a scripted mock.  The trait is object-safe
//! so [`crate::state::AppState`] can hold `Arc<dyn CompletionProvider>`.

pub mod openrouter;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors surfaced by a completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The request could not be started (connection, auth, bad model).
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider failed while the token stream was in flight.
    #[error("provider stream failed: {0}")]
    Stream(String),
}

/// One incremental unit of provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A reasoning-token delta (only for reasoning-capable models).
    ReasoningDelta(String),
    /// A response-text delta.
    TextDelta(String),
}

/// Author role of one history entry sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    System,
    User,
    Assistant,
}

/// One entry of the conversation history sent to the provider.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub text: String,
    /// Image URLs attached to a user message; empty for text-only turns.
    pub images: Vec<String>,
}

/// Requested reasoning depth, forwarded verbatim to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// A fully resolved generation request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model identifier as the provider expects it (already includes any
    /// web-search suffix).
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Per-request credential override; falls back to the provider default.
    pub api_key: Option<String>,
}

/// Event stream returned by [`CompletionProvider::stream_chat`].
pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, ProviderError>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streaming completion for the given history.
    ///
    /// The returned stream yields deltas in generation order and terminates
    /// when the provider signals completion; a mid-stream failure surfaces
    /// as an `Err` item and ends the stream.
    async fn stream_chat(&self, req: ProviderRequest) -> Result<ProviderStream, ProviderError>;

    /// Produce a short chat title for the given first user message.
    async fn generate_title(&self, model: &str, user_text: &str)
        -> Result<String, ProviderError>;
}
