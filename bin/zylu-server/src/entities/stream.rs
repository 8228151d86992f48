use std::future::Future;

use chrono::Utc;

use crate::entities::SqliteStore;

/// Append-only registry of generation attempts per chat.
///
/// The registry is the sole source of truth for "which stream is current":
/// the reattachment resolver always starts from [`StreamRegistry::latest_stream`].
/// Rows are never updated or deleted.
pub trait StreamRegistry: Send + Sync + 'static {
    fn append_stream(
        &self,
        chat_id: &str,
        stream_id: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// The most recently appended stream id for the chat, or `None` if no
    /// generation was ever attempted.
    fn latest_stream(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<String>, sqlx::Error>> + Send;
}

impl StreamRegistry for SqliteStore {
    async fn append_stream(&self, chat_id: &str, stream_id: &str) -> Result<(), sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO streams (chat_id, stream_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(chat_id)
        .bind(stream_id)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_stream(&self, chat_id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT stream_id FROM streams WHERE chat_id = ?1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(stream_id,)| stream_id))
    }
}
