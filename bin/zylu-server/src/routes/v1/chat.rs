//! Turn-start and resume routes.
//!
//! `POST /v1/chat` starts a generation turn and streams wire events over
//! SSE; the producer keeps running even if this response is dropped.
//! `GET /v1/chat/resume` reattaches to the most recent stream for a chat,
//! falling back to the persisted history once the broker buffer is gone.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::{Stream, StreamExt};
use tracing::{debug, info};
use utoipa::OpenApi;
use zylu_stream::StreamReader;

use crate::error::ServerError;
use crate::middleware::auth::Caller;
use crate::resolver::{self, ResumeOutcome};
use crate::schemas::v1::chat::{ResumeParams, StreamEvent, TurnRequest};
use crate::state::AppState;
use crate::{pipeline, schemas};

#[derive(OpenApi)]
#[openapi(
    paths(start_turn, resume),
    components(schemas(
        TurnRequest,
        schemas::v1::chat::TurnMessage,
        schemas::v1::chat::GenerationOptions,
        schemas::v1::chat::ReasoningEffortArg,
        schemas::v1::chat::Attachment,
        StreamEvent,
    ))
)]
pub struct ChatApi;

/// Register turn-start / resume routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(start_turn))
        .route("/chat/resume", get(resume))
}

/// Start a generation turn (`POST /v1/chat`).
///
/// The response is a chunked SSE stream of [`StreamEvent`]s.  Admission is
/// checked first: a denied caller gets 429 and no stream record is created.
#[utoipa::path(
    post,
    path = "/v1/chat",
    tag = "chat",
    request_body = TurnRequest,
    responses(
        (status = 200, description = "SSE stream of generation events"),
        (status = 400, description = "Malformed request or unknown model"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 429, description = "Rate limit exceeded"),
    )
)]
pub async fn start_turn(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<TurnRequest>,
) -> Result<Response, ServerError> {
    if !state.gate.allow(&caller.user_id) {
        return Err(ServerError::RateLimited);
    }

    info!(chat_id = %req.chat_id, model = %req.model, user_id = %caller.user_id, "turn requested");

    let reader = pipeline::start_turn(
        Arc::clone(&state.store),
        state.broker.clone(),
        Arc::clone(&state.provider),
        state.config.title_model.clone(),
        &caller.user_id,
        req,
    )
    .await?;

    Ok(sse_from_reader(reader).into_response())
}

/// Reattach to the most recent stream for a chat (`GET /v1/chat/resume`).
#[utoipa::path(
    get,
    path = "/v1/chat/resume",
    tag = "chat",
    params(ResumeParams),
    responses(
        (status = 200, description = "SSE stream of generation events"),
        (status = 204, description = "Resumable streams are disabled"),
        (status = 400, description = "Missing chat_id"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "No stream was ever created for this chat"),
    )
)]
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<ResumeParams>,
) -> Result<Response, ServerError> {
    if !state.config.resume_enabled {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let chat_id = params
        .chat_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("chat_id is required".into()))?;

    debug!(chat_id = %chat_id, user_id = %caller.user_id, "resume requested");

    match resolver::resume(&state.store, &state.broker, &chat_id).await? {
        ResumeOutcome::NoStreams => Err(ServerError::NotFound(format!(
            "no streams found for chat {chat_id}"
        ))),
        ResumeOutcome::Live(reader) => Ok(sse_from_reader(reader).into_response()),
        ResumeOutcome::Empty => Ok(sse_from_events(vec![StreamEvent::Finish]).into_response()),
        ResumeOutcome::Finished(message) => Ok(sse_from_events(vec![
            StreamEvent::AppendMessage { message },
            StreamEvent::Finish,
        ])
        .into_response()),
    }
}

// ── SSE helpers ──────────────────────────────────────────────────────────────

fn sse_from_reader(
    reader: StreamReader,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = reader.map(|chunk| {
        Ok(Event::default().data(String::from_utf8_lossy(&chunk).into_owned()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_from_events(
    events: Vec<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::iter(events.into_iter().map(|event| {
        Ok(Event::default().data(String::from_utf8_lossy(&event.encode()).into_owned()))
    }));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use zylu_stream::{BrokerConfig, StreamBroker};

    use crate::config::Config;
    use crate::entities::{SqliteStore, StreamRegistry};
    use crate::pipeline::testing::{turn_request, MockProvider};
    use crate::provider::ProviderEvent;
    use crate::ratelimit::{RateLimitConfig, SlidingWindow};

    async fn test_state(gate: RateLimitConfig) -> Arc<AppState> {
        let store = SqliteStore::connect("sqlite::memory:")
            .await
            .expect("in-memory store");
        let mut config = Config::from_env();
        config.resume_enabled = true;
        Arc::new(AppState {
            config: Arc::new(config),
            store: Arc::new(store),
            broker: StreamBroker::new(BrokerConfig::default()),
            gate: Arc::new(SlidingWindow::new(gate)),
            provider: MockProvider::with_events(vec![Ok(ProviderEvent::TextDelta(
                "ok".into(),
            ))]),
        })
    }

    fn caller() -> Caller {
        Caller {
            user_id: "u1".into(),
        }
    }

    #[tokio::test]
    async fn denied_admission_creates_no_stream_record() {
        let state = test_state(RateLimitConfig {
            max_admissions: 1,
            window: std::time::Duration::from_secs(10),
            enabled: true,
        })
        .await;

        let first = start_turn(
            State(Arc::clone(&state)),
            Extension(caller()),
            Json(turn_request("c1", "openai/gpt-4.1-nano", "hi")),
        )
        .await;
        assert!(first.is_ok());

        let second = start_turn(
            State(Arc::clone(&state)),
            Extension(caller()),
            Json(turn_request("c2", "openai/gpt-4.1-nano", "hi again")),
        )
        .await;
        assert!(matches!(second.unwrap_err(), ServerError::RateLimited));

        // The denied turn left no registry entry behind.
        assert!(state.store.latest_stream("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_without_chat_id_is_a_bad_request() {
        let state = test_state(RateLimitConfig::disabled()).await;
        let err = resume(
            State(state),
            Extension(caller()),
            Query(ResumeParams { chat_id: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn resume_unknown_chat_is_not_found() {
        let state = test_state(RateLimitConfig::disabled()).await;
        let err = resume(
            State(state),
            Extension(caller()),
            Query(ResumeParams {
                chat_id: Some("never-seen".into()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn resume_answers_204_when_disabled() {
        let state = test_state(RateLimitConfig::disabled()).await;
        let mut config = (*state.config).clone();
        config.resume_enabled = false;
        let state = Arc::new(AppState {
            config: Arc::new(config),
            ..(*state).clone()
        });

        let response = resume(
            State(state),
            Extension(caller()),
            Query(ResumeParams {
                chat_id: Some("c1".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
