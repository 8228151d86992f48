//! Model-catalog route.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::catalog::{self, ModelCapabilities, ModelConfig};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_models), components(schemas(ModelConfig, ModelCapabilities)))]
pub struct ModelsApi;

/// Register model-catalog routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/models", get(list_models))
}

/// List the available models and their capabilities (`GET /v1/models`).
#[utoipa::path(
    get,
    path = "/v1/models",
    tag = "models",
    responses(
        (status = 200, description = "Available models", body = [ModelConfig]),
        (status = 401, description = "Missing or invalid bearer token"),
    )
)]
pub async fn list_models() -> Json<&'static [ModelConfig]> {
    Json(catalog::MODELS)
}
