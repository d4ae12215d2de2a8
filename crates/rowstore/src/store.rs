use async_trait::async_trait;

use crate::error::StoreResult;
use crate::query::{ListQuery, Page, Row, Upload};

/// Named server-side views the client talks to.
pub mod views {
    /// The authenticated member, as a one-row list.
    pub const CURRENT_MEMBER: &str = "currentMember";
    /// Members visible to everyone, searchable by email.
    pub const PUBLIC_MEMBERS: &str = "publicMembers";
    /// Write target for registration.
    pub const MEMBER_DEFAULT: &str = "memberDefaultView";
    /// Every channel; used for lookups and membership relations.
    pub const CHANNEL_DEFAULT: &str = "channelDefaultView";
    /// Channels the current member belongs to.
    pub const JOINED_CHANNELS: &str = "joinedChannels";
    /// Messages filtered by channel.
    pub const CHANNEL_MESSAGES: &str = "channelMessages";
    /// Write target for messages and attachment uploads.
    pub const MESSAGES_DEFAULT: &str = "messagesDefaultView";
}

/// Operations the hosted backend exposes over its views.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn list(&self, view: &str, query: &ListQuery) -> StoreResult<Page>;

    /// `Ok(None)` when the view has no row with this id.
    async fn get(&self, view: &str, id: &str) -> StoreResult<Option<Row>>;

    /// Creates a row and returns it, including the generated id.
    async fn insert(&self, view: &str, fields: Row) -> StoreResult<Row>;

    /// Adds the referenced rows to relation fields of an existing row.
    async fn add_relation(&self, view: &str, id: &str, relations: Row) -> StoreResult<()>;

    /// Stores a file and returns its public URL.
    async fn upload(&self, view: &str, file: Upload) -> StoreResult<String>;

    /// Exchanges credentials for a session token.
    async fn authenticate(&self, email: &str, password: &str) -> StoreResult<String>;
}
