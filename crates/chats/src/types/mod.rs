//! Shared types for the chat client.

pub mod errors;

pub use errors::{ChatError, ChatResult};
