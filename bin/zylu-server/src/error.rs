//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! These conversions only apply to errors raised *before* the first byte of
//! a response stream is sent.  Once a generation stream has started, failures
//! are encoded as `error` events inside the stream instead, because status
//! and headers can no longer change.
//!
//! **Security note:** Internal errors (Database, Internal) are logged with
//! full detail but only a generic message is returned to the caller so that
//! file paths, SQL, or other implementation details never leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::provider::ProviderError;

/// All errors that can occur in the zylu-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller exhausted its sliding-window admission budget.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Missing or invalid bearer credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The requested model identifier is not in the catalog.
    #[error("provider not found for model: {0}")]
    ProviderNotFound(String),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Propagated from the SQLite (or other) store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The completion provider failed before streaming began.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_owned())
            }
            ServerError::Unauthenticated(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::ProviderNotFound(m) => {
                (StatusCode::BAD_REQUEST, format!("unknown model: {m}"))
            }
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),

            // Upstream provider failed before any byte was streamed.
            ServerError::Provider(e) => {
                error!(error = %e, "provider error before stream start");
                (StatusCode::BAD_GATEWAY, "completion provider error".to_owned())
            }

            // Internal errors: log the full detail, return a generic message.
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Log the full error chain before discarding it so that diagnostic
        // detail is preserved in the server logs even though clients only
        // see a generic message.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
