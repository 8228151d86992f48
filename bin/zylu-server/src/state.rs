//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use zylu_stream::StreamBroker;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::provider::CompletionProvider;
use crate::ratelimit::SlidingWindow;

/// State shared across all HTTP handlers and detached producer tasks.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Persistent chat / message / stream-registry store.
    pub store: Arc<SqliteStore>,
    /// In-memory broker for live and recently finished streams.
    pub broker: StreamBroker,
    /// Admission gate guarding stream creation.
    pub gate: Arc<SlidingWindow>,
    /// External completion provider.
    pub provider: Arc<dyn CompletionProvider>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .finish()
    }
}
