//! Message composer for the open channel.
//!
//! The composer keeps the draft text and at most one uploaded image. A
//! draft is cleared only after its insert succeeded, so a failed send can be
//! retried without retyping.

use chrono::Utc;
use huddle_rowstore::{views, RowStore, StoreError, Upload};
use tracing::{debug, info};

use crate::entities::{Member, Message, NewMessage};
use crate::types::{ChatError, ChatResult};
use crate::utils::Validator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum AttachmentState {
    #[default]
    Empty,
    Uploading {
        file_name: String,
    },
    Ready {
        url: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Composer {
    text: String,
    attachment: AttachmentState,
}

/// An upload claimed by [`Composer::start_upload`], to be completed with
/// [`Composer::finish_upload`].
#[derive(Debug)]
pub struct PendingUpload {
    file: Upload,
}

impl PendingUpload {
    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }

    pub async fn run(self, store: &dyn RowStore) -> Result<String, StoreError> {
        store.upload(views::MESSAGES_DEFAULT, self.file).await
    }
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn attachment(&self) -> Option<&str> {
        match &self.attachment {
            AttachmentState::Ready { url } => Some(url),
            _ => None,
        }
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.attachment, AttachmentState::Uploading { .. })
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = AttachmentState::Empty;
    }

    pub fn can_send(&self, member: Option<&Member>) -> bool {
        member.is_some() && !self.text.trim().is_empty() && !self.is_uploading()
    }

    /// Claims the upload slot for `file`. Only images are accepted and only
    /// one upload may be in flight.
    pub fn start_upload(&mut self, file: Upload) -> ChatResult<PendingUpload> {
        if self.is_uploading() {
            return Err(ChatError::busy("upload"));
        }
        Validator::image_content_type(&file.content_type)?;

        self.attachment = AttachmentState::Uploading {
            file_name: file.file_name.clone(),
        };
        Ok(PendingUpload { file })
    }

    /// Records the outcome of the claimed upload. The URL is kept only on
    /// success; a failure frees the slot and leaves no attachment.
    pub fn finish_upload(&mut self, result: Result<String, StoreError>) -> ChatResult<String> {
        let file_name = match &self.attachment {
            AttachmentState::Uploading { file_name } => file_name.clone(),
            _ => String::new(),
        };
        match result {
            Ok(url) => {
                info!(file_name = %file_name, url = %url, "Attachment uploaded");
                self.attachment = AttachmentState::Ready { url: url.clone() };
                Ok(url)
            }
            Err(err) => {
                self.attachment = AttachmentState::Empty;
                Err(err.into())
            }
        }
    }

    /// Uploads one image and keeps its URL for the next send.
    pub async fn attach(&mut self, store: &dyn RowStore, file: Upload) -> ChatResult<String> {
        let pending = self.start_upload(file)?;
        let result = pending.run(store).await;
        self.finish_upload(result)
    }

    /// Sends the draft to `channel_id`.
    ///
    /// Returns `Ok(None)` without touching the store when there is nothing
    /// to send, no member, or an upload still running.
    pub async fn send(
        &mut self,
        store: &dyn RowStore,
        member: Option<&Member>,
        channel_id: &str,
    ) -> ChatResult<Option<Message>> {
        let Some(member) = member.filter(|_| self.can_send(member)) else {
            debug!(channel_id = %channel_id, "Nothing to send");
            return Ok(None);
        };

        let draft = NewMessage {
            message: Validator::message_text(&self.text)?,
            from_id: member.id.clone(),
            channel_id: channel_id.to_string(),
            attachment: self.attachment().map(str::to_string),
            created_at: Utc::now(),
        };

        let created = store
            .insert(views::MESSAGES_DEFAULT, draft.to_fields())
            .await?;
        let id = created
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| StoreError::invalid_row("created message has no id"))?;

        let message = draft.into_message(id, member.as_reference());
        info!(channel_id = %channel_id, message_id = %message.id, "Message sent");

        self.text.clear();
        self.attachment = AttachmentState::Empty;
        Ok(Some(message))
    }
}
