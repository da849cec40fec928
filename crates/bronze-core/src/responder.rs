//! The platform capability consumed by the dispatcher.
//!
//! A [`Responder`] is the only way the core reaches the chat platform. The
//! gateway client that produces [`Event`](crate::Event)s attaches a responder
//! to each one, and handlers use it to answer the event's origin.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::event::Origin;
use crate::permissions::Permissions;

/// Platform identifier of a sent message.
pub type MessageId = String;

/// A shared, type-erased responder.
pub type BoxedResponder = Arc<dyn Responder>;

/// A single field of an [`Embed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A rich message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// Creates an empty embed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    /// Appends a field. Fields keep their insertion order.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// Content of a reply sent to an event's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text.
    Text(String),
    /// A rich embed.
    Embed(Embed),
    /// A file attachment.
    File {
        /// File name shown on the platform.
        name: String,
        /// Raw file contents.
        data: Vec<u8>,
    },
}

impl Reply {
    /// Returns the text body, if this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<Embed> for Reply {
    fn from(embed: Embed) -> Self {
        Reply::Embed(embed)
    }
}

/// Outbound capability of the chat platform.
///
/// Implementations translate these calls into platform requests. They must
/// be cheap to share: the dispatcher hands the same responder to every
/// handler that runs for an event.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Sends `reply` to the channel of `origin`.
    async fn reply(&self, origin: &Origin, reply: Reply) -> ApiResult<MessageId>;

    /// Deletes a message.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ApiResult<()>;

    /// Returns the permissions of the origin's author in the origin's channel.
    async fn author_permissions(&self, origin: &Origin) -> ApiResult<Permissions>;

    /// Returns the bot's own permissions in `channel_id`.
    async fn bot_permissions(&self, channel_id: &str) -> ApiResult<Permissions>;

    /// Returns `true` when the origin's author holds every bit of `required`.
    async fn verify_author(&self, origin: &Origin, required: Permissions) -> ApiResult<bool> {
        Ok(self.author_permissions(origin).await?.satisfies(required))
    }

    /// Returns `true` when the bot holds every bit of `required` in `channel_id`.
    async fn verify_bot(&self, channel_id: &str, required: Permissions) -> ApiResult<bool> {
        Ok(self.bot_permissions(channel_id).await?.satisfies(required))
    }
}
