//! Validation utilities.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ChatError;

/// Longest message body accepted by the composer.
pub const MAX_MESSAGE_CHARS: usize = 4000;

static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

/// Validation utilities
pub struct Validator;

impl Validator {
    /// Validate email format
    pub fn email(email: &str) -> Result<(), ChatError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ChatError::validation("Email is required"));
        }

        if email.len() > 255 {
            return Err(ChatError::validation("Email too long (max 255 characters)"));
        }

        let valid = EMAIL_REGEX
            .as_ref()
            .map(|regex| regex.is_match(email))
            .unwrap_or_else(|| email.contains('@'));
        if !valid {
            return Err(ChatError::validation("Invalid email format"));
        }

        Ok(())
    }

    pub fn password(password: &str) -> Result<(), ChatError> {
        if password.is_empty() {
            return Err(ChatError::validation("Password is required"));
        }
        Ok(())
    }

    /// Trailing newlines are dropped; everything else is sent as typed.
    pub fn message_text(text: &str) -> Result<String, ChatError> {
        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return Err(ChatError::validation("Message cannot be empty"));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::validation(format!(
                "Message too long (max {MAX_MESSAGE_CHARS} characters)"
            )));
        }
        Ok(text.to_string())
    }

    pub fn channel_name(name: &str) -> Result<String, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::validation("Channel name cannot be empty"));
        }
        if name.len() > 255 {
            return Err(ChatError::validation("Channel name too long (max 255 characters)"));
        }
        Ok(name.to_string())
    }

    pub fn image_content_type(content_type: &str) -> Result<(), ChatError> {
        if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(ChatError::validation("Only images can be attached"));
        }
        Ok(())
    }
}
