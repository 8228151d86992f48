//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, bearer auth on `/v1`)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `ZYLU_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - The `/v1` chat, resume, and catalog routes

pub mod doc;
mod health;
mod v1;

use std::sync::Arc;

use axum::{middleware, Router};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{auth, cors};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new().merge(health::router()).nest(
        "/v1",
        v1::router().layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        )),
    );

    let mut app = Router::new().merge(api_router);

    // ── Swagger UI ────────────────────────────────────────────────────────────
    // Enabled by default; disable with ZYLU_ENABLE_SWAGGER=false in production
    // to avoid exposing the API structure to potential attackers.
    if state.config.enable_swagger {
        app = app.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()),
        );
    }

    app.layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .with_state(state)
}
