//! # Huddle Chats Crate
//!
//! Client state for the Huddle chat: the message feed of the open channel,
//! the composer, the channel sidebar and the account flows.
//!
//! ## Architecture
//!
//! - **Entities**: rows of the backend views (Member, Channel, Message)
//! - **Services**: feed synchroniser, composer, sidebar, accounts, session
//! - **Types**: the error type shared by all services
//! - **Utils**: form and input validation
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use huddle_chats::{ChannelFeed, FeedSettings};
//! use huddle_rowstore::MemoryStore;
//!
//! # async fn demo() -> huddle_chats::ChatResult<()> {
//! let mut feed = ChannelFeed::new(Arc::new(MemoryStore::new()), FeedSettings::default());
//! feed.open("general").await?;
//! let more = feed.load_more().await?;
//! # Ok(())
//! # }
//! ```

pub mod entities;
pub mod services;
pub mod types;
pub mod utils;

pub use entities::{Channel, ChannelType, Member, Message, NewChannel, NewMessage, Reference};
pub use services::{
    fetch_channel, login, member_channel, poll_bound, register, ChannelFeed, Composer,
    FeedSettings, FeedSynchronizer, FileSessionStore, LoginForm, LoginGuard, MemberDirectory,
    MessageFeed, PendingUpload, PollHandle, Registrar, RegisterClient, RegistrationForm,
    Selection, SessionCookie, Sidebar, SidebarEntry, SidebarItem, LOGIN_ROUTE, TOKEN_COOKIE,
};
pub use types::{ChatError, ChatResult};
