//! Database abstraction layer.
//!
//! One trait per concern ([`ChatStore`], [`MessageStore`], [`StreamRegistry`],
//! [`AccountStore`]); the default implementation for all of them is
//! [`SqliteStore`].  To swap to another database (Postgres, MySQL, …),
//! implement the traits for your new type and change the concrete type in
//! [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures (stable since Rust
//! 1.75) so no extra `async-trait` crate is required on the storage path.

pub mod account;
pub mod chat;
pub mod dao;
pub mod message;
pub mod stream;

pub use account::AccountStore;
pub use chat::ChatStore;
pub use dao::{ChatRecord, MessagePart, MessageRecord, Role};
pub use message::MessageStore;
pub use stream::StreamRegistry;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// SQLite-backed store for chats, messages, stream records, and credentials.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://zylu.db"`
    /// or `"sqlite::memory:"` for tests.  The migrations directory is
    /// resolved relative to `CARGO_MANIFEST_DIR` at compile time and embedded
    /// into the binary.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

/// Parse an RFC 3339 timestamp column, falling back to `now` (with a warning)
/// rather than failing the whole query on one corrupt row.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────
