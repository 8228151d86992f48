use std::future::Future;

use crate::entities::{dao::ChatRecord, parse_timestamp, SqliteStore};

pub trait ChatStore: Send + Sync + 'static {
    fn insert_chat(
        &self,
        chat: ChatRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_chat(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ChatRecord>, sqlx::Error>> + Send;

    fn list_chats(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatRecord>, sqlx::Error>> + Send;

    fn delete_chat(&self, id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl ChatStore for SqliteStore {
    async fn insert_chat(&self, chat: ChatRecord) -> Result<(), sqlx::Error> {
        let created_at = chat.created_at.to_rfc3339();
        sqlx::query(
            "INSERT INTO chats (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chat(&self, id: &str) -> Result<Option<ChatRecord>, sqlx::Error> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, user_id, title, created_at FROM chats WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, user_id, title, created_at)| ChatRecord {
            id,
            user_id,
            title,
            created_at: parse_timestamp(&created_at),
        }))
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, sqlx::Error> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, user_id, title, created_at FROM chats \
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, user_id, title, created_at)| ChatRecord {
                id,
                user_id,
                title,
                created_at: parse_timestamp(&created_at),
            })
            .collect())
    }

    async fn delete_chat(&self, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM messages WHERE chat_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
