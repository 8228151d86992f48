//! Wire types for the `/v1/chat` turn-start and resume endpoints.
//!
//! A turn response (and a resumed stream) is a chunked SSE body whose `data:`
//! lines each carry one JSON-encoded [`StreamEvent`].  The same encoded form
//! is what the broker buffers, so a reconnecting client replays byte-identical
//! events.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::entities::MessageRecord;

// ── Turn start ───────────────────────────────────────────────────────────────

/// Requested reasoning depth for reasoning-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffortArg {
    Low,
    Medium,
    High,
}

/// Per-turn generation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerationOptions {
    /// Reasoning depth; ignored for models without reasoning support.
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffortArg>,
    /// Route the request through the provider's web-search variant.
    #[serde(default)]
    pub web_search: bool,
}

/// An attachment on an incoming user message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub url: String,
}

/// One entry of the conversation history sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Request body for `POST /v1/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TurnRequest {
    /// Client-generated opaque chat identifier.
    pub chat_id: String,
    /// Catalog model identifier.
    pub model: String,
    #[serde(default)]
    pub options: GenerationOptions,
    /// Conversation history; the last entry must be the new user message.
    pub messages: Vec<TurnMessage>,
    /// Optional system prompt prepended to the built-in one.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Optional provider-credential override for this turn only.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Query parameters for `GET /v1/chat/resume`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ResumeParams {
    pub chat_id: Option<String>,
}

// ── Stream events ────────────────────────────────────────────────────────────

/// One event on the generation wire.
///
/// Deltas arrive in generation order (reasoning before text for reasoning
/// models); `error` and `finish` are terminal.  `append-message` is only
/// produced when a resumed turn has already left the broker's retention
/// window and the full persisted message is replayed in one piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
    AppendMessage { message: MessageRecord },
    Error { message: String },
    Finish,
}

impl StreamEvent {
    /// Encode for broker buffering / SSE transport.
    pub fn encode(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(v) => Bytes::from(v),
            Err(e) => {
                error!(error = %e, "failed to encode stream event");
                Bytes::from_static(br#"{"type":"error","message":"event encoding failed"}"#)
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn events_carry_kebab_case_tags() {
        let json = serde_json::to_value(StreamEvent::TextDelta { delta: "4".into() }).unwrap();
        assert_eq!(json["type"], "text-delta");
        assert_eq!(json["delta"], "4");

        let json = serde_json::to_value(StreamEvent::Finish).unwrap();
        assert_eq!(json["type"], "finish");
    }

    #[test]
    fn encode_decode_round_trip() {
        let event = StreamEvent::ReasoningDelta {
            delta: "thinking".into(),
        };
        let decoded = StreamEvent::decode(&event.encode()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn options_default_to_no_reasoning_and_no_search() {
        let req: TurnRequest = serde_json::from_str(
            r#"{"chat_id":"c1","model":"m","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert!(req.options.reasoning_effort.is_none());
        assert!(!req.options.web_search);
        assert!(req.messages[0].attachments.is_empty());
    }
}
