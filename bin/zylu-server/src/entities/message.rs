use std::future::Future;

use crate::entities::{
    dao::{MessagePart, MessageRecord, Role},
    parse_timestamp, SqliteStore,
};

pub trait MessageStore: Send + Sync + 'static {
    fn append_message(
        &self,
        msg: MessageRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// All messages of a chat in append order.
    fn list_messages(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, sqlx::Error>> + Send;

    /// The most recently appended message of a chat, if any.
    fn latest_message(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, sqlx::Error>> + Send;
}

type MessageRow = (String, String, String, String, String, String, String);

fn row_to_record(row: MessageRow) -> MessageRecord {
    let (id, chat_id, user_id, role, parts, model, created_at) = row;
    let role = Role::parse(&role).unwrap_or_else(|| {
        tracing::warn!(raw = %role, "unknown role in messages table; treating as user");
        Role::User
    });
    let parts: Vec<MessagePart> = serde_json::from_str(&parts).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to decode message parts column");
        Vec::new()
    });
    MessageRecord {
        id,
        chat_id,
        user_id,
        role,
        parts,
        model,
        created_at: parse_timestamp(&created_at),
    }
}

impl MessageStore for SqliteStore {
    async fn append_message(&self, msg: MessageRecord) -> Result<(), sqlx::Error> {
        let parts = serde_json::to_string(&msg.parts)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let created_at = msg.created_at.to_rfc3339();
        sqlx::query(
            "INSERT INTO messages (id, chat_id, user_id, role, parts, model, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&msg.id)
        .bind(&msg.chat_id)
        .bind(&msg.user_id)
        .bind(msg.role.as_str())
        .bind(&parts)
        .bind(&msg.model)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<MessageRecord>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, chat_id, user_id, role, parts, model, created_at \
             FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn latest_message(
        &self,
        chat_id: &str,
    ) -> Result<Option<MessageRecord>, sqlx::Error> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, chat_id, user_id, role, parts, model, created_at \
             FROM messages WHERE chat_id = ?1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }
}
