//! Bearer-credential middleware.
//!
//! The credential is opaque to this layer; the store maps it to a user id.
//! Requests without a valid token are rejected before any stream work begins.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::entities::AccountStore;
use crate::error::ServerError;
use crate::state::AppState;

/// The authenticated caller, injected as a request extension.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ServerError::Unauthenticated("missing bearer token".into()).into_response();
    };

    match state.store.user_for_token(token).await {
        Ok(Some(user_id)) => {
            req.extensions_mut().insert(Caller { user_id });
            next.run(req).await
        }
        Ok(None) => ServerError::Unauthenticated("invalid bearer token".into()).into_response(),
        Err(e) => ServerError::Database(e).into_response(),
    }
}
