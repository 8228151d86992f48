use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Message author role.  Only the generation pipeline writes `Assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One content fragment of a message.
///
/// A closed sum type: each tag carries exactly the fields that are valid for
/// it, so a `reasoning` part can never half-populate `text` and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text { text: String },
    Reasoning { reasoning: String },
    Image { image: String },
    File { file: String },
}

/// A single row in the `messages` table.
///
/// `parts` is stored as a JSON array in a TEXT column; ordering inside a chat
/// is by the table's autoincrement `seq`, which the record itself does not
/// need to carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessageRecord {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    /// Model identifier that produced (or received) this message.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn part_tags_serialize_with_per_tag_fields() {
        let json = serde_json::to_value(MessagePart::Reasoning {
            reasoning: "step 1".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "reasoning");
        assert_eq!(json["reasoning"], "step 1");
        assert!(json.get("text").is_none());
    }

    #[test]
    fn unknown_part_tag_is_rejected() {
        let err = serde_json::from_str::<MessagePart>(r#"{"type":"video","video":"x"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn role_round_trips_as_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("system"), None);
    }
}
