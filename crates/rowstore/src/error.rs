//! Error types for row store calls.

use thiserror::Error;

/// Result type alias for row store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a single call against the row store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request failed with status code 401")]
    Unauthorized,

    #[error("Row not found")]
    NotFound,

    #[error("Request failed with status code {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid row: {message}")]
    InvalidRow { message: String },
}

impl StoreError {
    /// Build the error matching an HTTP status and upstream message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            404 => Self::NotFound,
            _ => Self::Http {
                status,
                message: message.into(),
            },
        }
    }

    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow {
            message: message.into(),
        }
    }

    /// HTTP status behind this error, if the call reached the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::NotFound => Some(404),
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Decode(_) | Self::InvalidRow { .. } => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
