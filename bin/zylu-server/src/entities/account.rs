use std::future::Future;

use chrono::Utc;

use crate::entities::SqliteStore;

/// Bearer-credential lookup.
///
/// The credential itself is opaque; this layer only maps it to a user id.
pub trait AccountStore: Send + Sync + 'static {
    fn user_for_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<String>, sqlx::Error>> + Send;

    fn insert_token(
        &self,
        token: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl AccountStore for SqliteStore {
    async fn user_for_token(&self, token: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM api_tokens WHERE token = ?1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn insert_token(&self, token: &str, user_id: &str) -> Result<(), sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO api_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(token)
        .bind(user_id)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
