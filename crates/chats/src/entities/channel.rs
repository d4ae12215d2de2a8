use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::reference::{deserialize_references, Reference};

/// A conversation: either a named channel or a two-member direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub channel_type: ChannelType,
    #[serde(
        rename = "member1",
        default,
        deserialize_with = "deserialize_references"
    )]
    pub members: Vec<Reference>,
}

/// Channel type enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    Channel,
    Private,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Channel => "channel",
            ChannelType::Private => "private",
        }
    }
}

impl Channel {
    pub fn is_private(&self) -> bool {
        matches!(self.channel_type, ChannelType::Private)
    }

    pub fn has_member(&self, member_id: &str) -> bool {
        self.members.iter().any(|member| member.id == member_id)
    }

    /// The other participant of a direct message, from `member_id`'s side.
    pub fn counterpart(&self, member_id: &str) -> Option<&Reference> {
        self.members.iter().find(|member| member.id != member_id)
    }

    /// Sidebar label. Direct messages are named after the other member.
    pub fn title_for(&self, member_id: Option<&str>) -> String {
        match self.channel_type {
            ChannelType::Channel => format!("#{}", self.name),
            ChannelType::Private => member_id
                .and_then(|id| self.counterpart(id))
                .map(|other| other.label().to_string())
                .unwrap_or_else(|| "Direct message".to_string()),
        }
    }
}

/// Fields for a channel insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub channel_type: ChannelType,
    pub member_ids: Vec<String>,
}

impl NewChannel {
    pub fn public(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel_type: ChannelType::Channel,
            member_ids: vec![owner_id.into()],
        }
    }

    /// Direct messages carry no name, only both members.
    pub fn direct(owner_id: impl Into<String>, other_id: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            channel_type: ChannelType::Private,
            member_ids: vec![owner_id.into(), other_id.into()],
        }
    }

    /// The channel as stored under `id`.
    pub fn into_channel(self, id: impl Into<String>) -> Channel {
        Channel {
            id: id.into(),
            name: self.name,
            channel_type: self.channel_type,
            members: self.member_ids.into_iter().map(Reference::new).collect(),
        }
    }

    pub fn to_fields(&self) -> Value {
        json!({
            "name": self.name,
            "member1": self.member_ids,
            "type": self.channel_type.as_str(),
        })
    }
}
