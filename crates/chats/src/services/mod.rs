//! Client-side services.
//!
//! Each service owns one piece of UI state and talks to the backend through
//! the [`huddle_rowstore::RowStore`] trait, so every service runs the same
//! against the HTTP client and the in-memory store.

pub mod account;
pub mod composer;
pub mod directory;
pub mod feed;
pub mod session;
pub mod sidebar;

pub use account::{login, register, LoginForm, Registrar, RegisterClient, RegistrationForm};
pub use composer::{Composer, PendingUpload};
pub use directory::{fetch_channel, member_channel, MemberDirectory};
pub use feed::{
    poll_bound, ChannelFeed, FeedSettings, FeedSynchronizer, MessageFeed, PollHandle,
};
pub use session::{FileSessionStore, LoginGuard, SessionCookie, LOGIN_ROUTE, TOKEN_COOKIE};
pub use sidebar::{Selection, Sidebar, SidebarEntry, SidebarItem};
