//! Chat-history routes: list chats, delete a chat, list its messages.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use utoipa::OpenApi;

use crate::entities::{ChatRecord, ChatStore, MessageRecord, MessageStore};
use crate::error::ServerError;
use crate::middleware::auth::Caller;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_chats, delete_chat, list_chat_messages),
    components(schemas(ChatRecord, MessageRecord))
)]
pub struct ChatsApi;

/// Register chat-history routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chats", get(list_chats))
        .route("/chats/{id}", axum::routing::delete(delete_chat))
        .route("/chats/{id}/messages", get(list_chat_messages))
}

/// List the caller's chats, newest first (`GET /v1/chats`).
#[utoipa::path(
    get,
    path = "/v1/chats",
    tag = "chats",
    responses(
        (status = 200, description = "Chats owned by the caller", body = [ChatRecord]),
        (status = 401, description = "Missing or invalid bearer token"),
    )
)]
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<ChatRecord>>, ServerError> {
    let chats = state.store.list_chats(&caller.user_id).await?;
    Ok(Json(chats))
}

/// Delete a chat and its messages (`DELETE /v1/chats/{id}`).
#[utoipa::path(
    delete,
    path = "/v1/chats/{id}",
    tag = "chats",
    params(("id" = String, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Chat deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Chat does not exist or belongs to someone else"),
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let chat = state
        .store
        .get_chat(&id)
        .await?
        .filter(|c| c.user_id == caller.user_id)
        .ok_or_else(|| ServerError::NotFound(format!("chat {id} not found")))?;

    state.store.delete_chat(&chat.id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// List a chat's messages in creation order (`GET /v1/chats/{id}/messages`).
#[utoipa::path(
    get,
    path = "/v1/chats/{id}/messages",
    tag = "chats",
    params(("id" = String, Path, description = "Chat identifier")),
    responses(
        (status = 200, description = "Messages in creation order", body = [MessageRecord]),
        (status = 401, description = "Missing or invalid bearer token"),
    )
)]
pub async fn list_chat_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ServerError> {
    let messages = state.store.list_messages(&id).await?;
    Ok(Json(messages))
}
