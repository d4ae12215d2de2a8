use serde::{Deserialize, Serialize};

use super::reference::Reference;

/// A registered participant. Members are created by registration and are
/// read-only from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub email: String,
    /// Server-computed display name.
    #[serde(default, rename = "displayField")]
    pub display_field: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_field: None,
        }
    }

    /// Name shown next to messages: the display field, else the email.
    pub fn display_name(&self) -> &str {
        match self.display_field.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }

    /// Uppercased first letter of the display name, used as an avatar.
    pub fn initial(&self) -> Option<char> {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
    }

    pub fn as_reference(&self) -> Reference {
        Reference::new(self.id.clone()).with_display(self.display_name())
    }
}
