//! Channel selection, creation, joining and direct messages.
//!
//! The sidebar is a small state machine. Selecting a joined channel moves
//! straight to [`Selection::Selected`]; creating a channel, joining one or
//! opening a direct message passes through a transitional state while the
//! store call runs. Only one transition may run at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_rowstore::{views, ListQuery, RowStore, StoreError};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::entities::{Channel, ChannelType, Member, NewChannel};
use crate::services::directory::fetch_channel;
use crate::types::{ChatError, ChatResult};
use crate::utils::Validator;

/// People suggested for a direct message while searching.
pub const MEMBER_SUGGESTIONS: u32 = 5;
/// Unjoined channels offered while searching.
pub const CHANNEL_SUGGESTIONS: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    NoChannel,
    Selected(String),
    CreatingChannel,
    JoiningChannel(String),
    CreatingDm(Member),
}

impl Selection {
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Selection::Selected(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Selection::CreatingChannel | Selection::JoiningChannel(_) | Selection::CreatingDm(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidebarItem {
    Channel(String),
    NewChannel,
    JoinChannel(String),
    DirectMessage(Member),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub item: SidebarItem,
    pub label: String,
}

#[derive(Debug, Default)]
struct SidebarState {
    selection: Selection,
    search: String,
    member: Option<Member>,
    joined: Vec<Channel>,
    discoverable: Vec<Channel>,
    people: Vec<Member>,
}

pub struct Sidebar {
    store: Arc<dyn RowStore>,
    state: Mutex<SidebarState>,
    selection: watch::Sender<Selection>,
}

impl Sidebar {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        let (selection, _) = watch::channel(Selection::NoChannel);
        Self {
            store,
            state: Mutex::new(SidebarState::default()),
            selection,
        }
    }

    fn state(&self) -> MutexGuard<'_, SidebarState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_selection(&self, state: &mut SidebarState, selection: Selection) {
        state.selection = selection.clone();
        self.selection.send_replace(selection);
    }

    pub fn set_member(&self, member: Option<Member>) {
        self.state().member = member;
    }

    pub fn member(&self) -> Option<Member> {
        self.state().member.clone()
    }

    pub fn set_search(&self, text: impl Into<String>) {
        self.state().search = text.into();
    }

    pub fn search(&self) -> String {
        self.state().search.clone()
    }

    pub fn selection(&self) -> Selection {
        self.state().selection.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.selection.subscribe()
    }

    pub fn joined_channels(&self) -> Vec<Channel> {
        self.state().joined.clone()
    }

    /// Reloads the joined channels and, while searching, the member and
    /// channel suggestions. Nothing is fetched without a member.
    pub async fn refresh(&self) -> ChatResult<()> {
        let (member, search) = {
            let state = self.state();
            (state.member.clone(), state.search.clone())
        };
        let Some(member) = member else {
            let mut state = self.state();
            state.joined.clear();
            state.discoverable.clear();
            state.people.clear();
            return Ok(());
        };

        let joined = self.list_channels(views::JOINED_CHANNELS, ListQuery::new().search(&search)).await?;

        let (people, discoverable) = if search.trim().is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let rows = self
                .store
                .list(
                    views::PUBLIC_MEMBERS,
                    &ListQuery::new().search(&search).limit(MEMBER_SUGGESTIONS),
                )
                .await?;
            let people = rows
                .nodes
                .into_iter()
                .map(serde_json::from_value::<Member>)
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|candidate| candidate.id != member.id)
                .collect();

            let discoverable = self
                .list_channels(
                    views::CHANNEL_DEFAULT,
                    ListQuery::new()
                        .search(&search)
                        .filter("type", ChannelType::Channel.as_str())
                        .limit(CHANNEL_SUGGESTIONS),
                )
                .await?
                .into_iter()
                .filter(|channel| {
                    !channel.has_member(&member.id) && !joined.iter().any(|j| j.id == channel.id)
                })
                .collect();
            (people, discoverable)
        };

        debug!(joined = joined.len(), search = %search, "Sidebar refreshed");
        let mut state = self.state();
        state.joined = joined;
        state.people = people;
        state.discoverable = discoverable;
        Ok(())
    }

    async fn list_channels(&self, view: &str, query: ListQuery) -> ChatResult<Vec<Channel>> {
        let page = self.store.list(view, &query).await?;
        page.nodes
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(ChatError::from))
            .collect()
    }

    /// The rendered menu: the new-channel entry, direct message
    /// suggestions, joinable channels, then joined channels.
    pub fn entries(&self) -> Vec<SidebarEntry> {
        let state = self.state();
        let me = state.member.as_ref().map(|member| member.id.as_str());
        let mut entries = Vec::new();

        if !state.search.trim().is_empty() {
            entries.push(SidebarEntry {
                item: SidebarItem::NewChannel,
                label: format!("New channel \"{}\"", state.search.trim()),
            });
        }
        entries.extend(state.people.iter().map(|person| SidebarEntry {
            item: SidebarItem::DirectMessage(person.clone()),
            label: format!("DM to {}", person.email),
        }));
        entries.extend(state.discoverable.iter().map(|channel| SidebarEntry {
            item: SidebarItem::JoinChannel(channel.id.clone()),
            label: format!("Join #{}", channel.name),
        }));
        entries.extend(state.joined.iter().map(|channel| SidebarEntry {
            item: SidebarItem::Channel(channel.id.clone()),
            label: channel.title_for(me),
        }));
        entries
    }

    /// Applies a menu choice and returns the resulting selection.
    ///
    /// Every choice needs a member. A plain selection is limited to joined
    /// channels. Creation, joining and direct messages are refused while
    /// another transition runs, and a failed store call restores the
    /// previous selection.
    pub async fn select(&self, item: SidebarItem) -> ChatResult<Selection> {
        let (previous, me, name) = {
            let mut state = self.state();
            if state.selection.is_transitioning() {
                return Err(ChatError::busy("channel change"));
            }
            let previous = state.selection.clone();
            let me = state.member.clone().ok_or(ChatError::NotAuthenticated)?;

            if let SidebarItem::Channel(id) = &item {
                if !state.joined.iter().any(|channel| &channel.id == id) {
                    return Err(ChatError::not_member(id.as_str()));
                }
                state.search.clear();
                self.set_selection(&mut state, Selection::Selected(id.clone()));
                return Ok(state.selection.clone());
            }

            let name = match &item {
                SidebarItem::NewChannel => Validator::channel_name(&state.search)?,
                _ => String::new(),
            };

            let pending = match &item {
                SidebarItem::JoinChannel(id) => Selection::JoiningChannel(id.clone()),
                SidebarItem::DirectMessage(other) => Selection::CreatingDm(other.clone()),
                _ => Selection::CreatingChannel,
            };
            self.set_selection(&mut state, pending);
            (previous, me, name)
        };

        let outcome = match &item {
            SidebarItem::NewChannel => {
                info!(name = %name, "Creating channel");
                self.create(NewChannel::public(name, me.id.clone())).await
            }
            SidebarItem::JoinChannel(id) => self.join(&me, id).await,
            SidebarItem::DirectMessage(other) => {
                info!(member_id = %other.id, "Opening direct message");
                self.create(NewChannel::direct(me.id.clone(), other.id.clone()))
                    .await
            }
            SidebarItem::Channel(id) => Err(ChatError::not_member(id.as_str())),
        };

        let selection = {
            let mut state = self.state();
            match outcome {
                Ok(channel) => {
                    state.search.clear();
                    let selection = Selection::Selected(channel.id.clone());
                    if !state.joined.iter().any(|joined| joined.id == channel.id) {
                        state.joined.push(channel);
                    }
                    self.set_selection(&mut state, selection);
                    state.selection.clone()
                }
                Err(err) => {
                    warn!(error = %err, "Channel change failed");
                    self.set_selection(&mut state, previous);
                    return Err(err);
                }
            }
        };

        if let Err(err) = self.refresh().await {
            warn!(error = %err, "Could not reload channels after selection");
        }
        Ok(selection)
    }

    /// Adds `me` to a public channel. Private channels are never joined from
    /// outside; a channel `me` already belongs to is selected as is.
    async fn join(&self, me: &Member, channel_id: &str) -> ChatResult<Channel> {
        let mut channel = fetch_channel(self.store.as_ref(), channel_id).await?;
        if channel.has_member(&me.id) {
            debug!(channel_id = %channel_id, "Already a member");
            return Ok(channel);
        }
        if channel.is_private() {
            return Err(ChatError::not_member(channel_id));
        }

        info!(channel_id = %channel_id, "Joining channel");
        self.store
            .add_relation(views::CHANNEL_DEFAULT, channel_id, json!({ "member1": [me.id] }))
            .await?;
        channel.members.push(me.as_reference());
        Ok(channel)
    }

    async fn create(&self, channel: NewChannel) -> ChatResult<Channel> {
        let created = self
            .store
            .insert(views::JOINED_CHANNELS, channel.to_fields())
            .await?;
        let id = created
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| StoreError::invalid_row("created channel has no id"))?;
        Ok(channel.into_channel(id))
    }
}
