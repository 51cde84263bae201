//! Message domain model.
//!
//! `Message` mirrors the thread service's stored form. Drafts and attachments are the
//! client-side inputs a message is created or edited from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded file. The bytes live in media storage, addressed by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub filename: String,
    pub content_type: String,
}

impl MediaFile {
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }
}

const fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    #[serde(default)]
    media_files: Vec<MediaFile>,
    #[serde(default = "default_visible")]
    visible: bool,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            media_files: Vec::new(),
            visible: true,
        }
    }

    #[must_use]
    pub fn user(id: MessageId, content: impl Into<String>, media_files: Vec<MediaFile>) -> Self {
        Self::new(id, Role::User, content).with_media_files(media_files)
    }

    #[must_use]
    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    #[must_use]
    pub fn with_media_files(mut self, media_files: Vec<MediaFile>) -> Self {
        self.media_files = media_files;
        self
    }

    /// Journey seeds are stored hidden until the journey starts.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn media_files(&self) -> &[MediaFile] {
        &self.media_files
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Overwrite the body, reusing the existing allocation.
    pub fn set_content(&mut self, content: &str) {
        self.content.clear();
        self.content.push_str(content);
    }

    pub fn reveal(&mut self) {
        self.visible = true;
    }

    /// Copy of this message with its body and attachments replaced wholesale.
    #[must_use]
    pub fn edited(&self, content: impl Into<String>, media_files: Vec<MediaFile>) -> Self {
        Self {
            id: self.id.clone(),
            role: self.role,
            content: content.into(),
            media_files,
            visible: self.visible,
        }
    }
}

/// A file the user attached to a draft.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    #[must_use]
    pub fn media_file(&self) -> MediaFile {
        MediaFile::new(self.filename.clone(), self.content_type.clone())
    }
}

// Manual Debug impl so file contents never end up in logs.
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// User input for a send or an edit: text plus zero or more attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn media_files(&self) -> Vec<MediaFile> {
        self.attachments.iter().map(Attachment::media_file).collect()
    }
}

/// Payload for persisting a new message in a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<Attachment>,
    /// Client-chosen id; the backend assigns one when absent.
    pub message_id: Option<MessageId>,
}

impl NewMessage {
    #[must_use]
    pub fn user(draft: MessageDraft) -> Self {
        Self {
            role: Role::User,
            content: draft.content,
            attachments: draft.attachments,
            message_id: None,
        }
    }

    #[must_use]
    pub fn assistant_reply(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
            message_id: Some(id),
        }
    }
}

/// What the backend does with the messages an edit cuts off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Delete discarded messages and their media.
    #[default]
    Delete,
    /// Keep discarded messages stored but hidden.
    Hide,
}

impl OrphanPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OrphanPolicy::Delete => "delete",
            OrphanPolicy::Hide => "hide",
        }
    }
}
