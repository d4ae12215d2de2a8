//! Error types for the chat client.

use huddle_rowstore::StoreError;
use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Main error type for the chat client
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Channel {id} does not exist")]
    ChannelNotFound { id: String },

    #[error("Not a member of channel {id}")]
    NotMember { id: String },

    #[error("Channel {id} is no longer open")]
    StaleChannel { id: String },

    #[error("Another {action} is still in progress")]
    Busy { action: &'static str },

    #[error("Registration failed ({status}): {message}")]
    Registration { status: u16, message: String },

    #[error("Session storage error: {0}")]
    Session(#[from] std::io::Error),
}

impl ChatError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn channel_not_found(id: impl Into<String>) -> Self {
        Self::ChannelNotFound { id: id.into() }
    }

    pub fn not_member(id: impl Into<String>) -> Self {
        Self::NotMember { id: id.into() }
    }

    pub fn stale_channel(id: impl Into<String>) -> Self {
        Self::StaleChannel { id: id.into() }
    }

    pub fn busy(action: &'static str) -> Self {
        Self::Busy { action }
    }

    pub fn registration(status: u16, message: impl Into<String>) -> Self {
        Self::Registration {
            status,
            message: message.into(),
        }
    }

    /// The store error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Store(err) => err.is_unauthorized(),
            Self::Registration { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Store(StoreError::Transport(err))
    }
}
