//! Message entity.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::reference::Reference;

/// A posted message. Messages are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub message: String,
    /// Public URL of an uploaded image.
    #[serde(
        default,
        deserialize_with = "deserialize_attachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub attachment: Option<String>,
    pub from: Reference,
    pub channel: Reference,
    pub created_at: DateTime<Utc>,
}

fn deserialize_attachment<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|url| !url.trim().is_empty()))
}

impl Message {
    /// Feed order: newest first, ties broken by descending id.
    pub fn feed_order(a: &Message, b: &Message) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }

    pub fn belongs_to(&self, channel_id: &str) -> bool {
        self.channel.id == channel_id
    }

    pub fn author_label(&self) -> &str {
        self.from.label()
    }
}

/// Fields for a message insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub message: String,
    pub from_id: String,
    pub channel_id: String,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn to_fields(&self) -> Value {
        let mut fields = json!({
            "message": self.message,
            "from": [self.from_id],
            "channel": [self.channel_id],
            "createdAt": self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let (Some(url), Value::Object(map)) = (&self.attachment, &mut fields) {
            map.insert("attachment".to_string(), Value::String(url.clone()));
        }
        fields
    }

    /// The message as it will appear once stored under `id`.
    pub fn into_message(self, id: impl Into<String>, author: Reference) -> Message {
        Message {
            id: id.into(),
            message: self.message,
            attachment: self.attachment,
            from: author,
            channel: Reference::new(self.channel_id),
            created_at: self.created_at,
        }
    }
}
