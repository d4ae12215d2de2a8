//! Domain entities for the chat client.
//!
//! These mirror the rows returned by the backend views. Relation fields are
//! decoded through [`Reference`], which accepts every shape the views use.

pub mod channel;
pub mod member;
pub mod message;
pub mod reference;

pub use channel::{Channel, ChannelType, NewChannel};
pub use member::Member;
pub use message::{Message, NewMessage};
pub use reference::Reference;
