use std::sync::Arc;

use huddle_rowstore::{views, ListQuery, RowStore};
use tracing::debug;

use crate::entities::{Channel, Member};
use crate::types::{ChatError, ChatResult};

/// Member lookups backed by the member views.
#[derive(Clone)]
pub struct MemberDirectory {
    store: Arc<dyn RowStore>,
}

impl MemberDirectory {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// The member behind the current token, if any.
    pub async fn current_member(&self) -> ChatResult<Option<Member>> {
        let page = self
            .store
            .list(views::CURRENT_MEMBER, &ListQuery::new().limit(1))
            .await?;
        let member = page
            .nodes
            .into_iter()
            .next()
            .map(serde_json::from_value::<Member>)
            .transpose()?;
        debug!(found = member.is_some(), "Resolved current member");
        Ok(member)
    }

    pub async fn search(&self, text: &str, limit: u32) -> ChatResult<Vec<Member>> {
        let page = self
            .store
            .list(views::PUBLIC_MEMBERS, &ListQuery::new().search(text).limit(limit))
            .await?;
        Ok(page
            .nodes
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?)
    }
}

/// Loads one channel row. An unknown id is [`ChatError::ChannelNotFound`].
pub async fn fetch_channel(store: &dyn RowStore, channel_id: &str) -> ChatResult<Channel> {
    let row = store
        .get(views::CHANNEL_DEFAULT, channel_id)
        .await?
        .ok_or_else(|| ChatError::channel_not_found(channel_id))?;
    Ok(serde_json::from_value(row)?)
}

/// Loads a channel `member` may open, which is one they belong to.
pub async fn member_channel(
    store: &dyn RowStore,
    member: &Member,
    channel_id: &str,
) -> ChatResult<Channel> {
    let channel = fetch_channel(store, channel_id).await?;
    if !channel.has_member(&member.id) {
        debug!(channel_id = %channel_id, member_id = %member.id, "Member is not in channel");
        return Err(ChatError::not_member(channel_id));
    }
    Ok(channel)
}
