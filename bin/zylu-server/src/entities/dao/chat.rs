use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single row in the `chats` table.
///
/// `id` is client-generated and opaque; the row is created lazily when the
/// first message of a conversation arrives.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
