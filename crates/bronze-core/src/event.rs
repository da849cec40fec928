//! Normalized inbound events.
//!
//! The gateway client converts every platform occurrence it cares about into
//! an [`Event`] before handing it to the dispatcher:
//!
//! ```rust,ignore
//! use bronze_core::{Event, EventKind, Origin};
//!
//! let event = Event::new(
//!     EventKind::CREATE,
//!     Origin::guild("channel-1", "guild-1", "user-7"),
//!     ".ping",
//!     responder.clone(),
//! )
//! .with_message_id("msg-42");
//! ```
//!
//! Events are immutable once built. The dispatcher wraps each one in an
//! `Arc` and shares it read-only with every handler it invokes.

use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiResult;
use crate::responder::{BoxedResponder, MessageId, Reply};

// ============================================================================
// Event Kind
// ============================================================================

bitflags! {
    /// Classification of an inbound event.
    ///
    /// Modules, commands and passives declare the kinds they accept as a
    /// mask; an event is accepted when its kind intersects the mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventKind: u8 {
        /// A message was created.
        const CREATE      = 0b0001;
        /// A message was edited.
        const UPDATE      = 0b0010;
        /// A message was deleted.
        const DELETE      = 0b0100;
        /// A platform-native interaction (slash command) was invoked.
        const INTERACTION = 0b1000;

        /// Every message lifecycle kind.
        const MESSAGES = Self::CREATE.bits() | Self::UPDATE.bits() | Self::DELETE.bits();
        /// Every kind.
        const ALL = Self::MESSAGES.bits() | Self::INTERACTION.bits();
    }
}

impl EventKind {
    /// Returns `true` if `self` and `mask` share at least one bit.
    pub fn accepted_by(self, mask: EventKind) -> bool {
        self.intersects(mask)
    }
}

impl Default for EventKind {
    fn default() -> Self {
        EventKind::CREATE
    }
}

// ============================================================================
// Origin
// ============================================================================

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// The channel the event happened in.
    pub channel_id: String,
    /// The guild the channel belongs to; `None` for direct messages.
    pub guild_id: Option<String>,
    /// The user who caused the event.
    pub author_id: String,
}

impl Origin {
    /// Creates an origin inside a guild channel.
    pub fn guild(
        channel_id: impl Into<String>,
        guild_id: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            guild_id: Some(guild_id.into()),
            author_id: author_id.into(),
        }
    }

    /// Creates a direct-message origin.
    pub fn direct(channel_id: impl Into<String>, author_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            guild_id: None,
            author_id: author_id.into(),
        }
    }

    /// Returns `true` for direct messages.
    pub fn is_direct(&self) -> bool {
        self.guild_id.as_deref().is_none_or(str::is_empty)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A normalized inbound occurrence from the chat platform.
#[derive(Clone)]
pub struct Event {
    kind: EventKind,
    origin: Origin,
    message_id: Option<String>,
    content: String,
    interaction: Option<String>,
    payload: Value,
    received_at: SystemTime,
    responder: BoxedResponder,
}

impl Event {
    /// Creates an event. `content` is trimmed; the receipt time is now.
    pub fn new(
        kind: EventKind,
        origin: Origin,
        content: impl Into<String>,
        responder: BoxedResponder,
    ) -> Self {
        let content: String = content.into();
        Self {
            kind,
            origin,
            message_id: None,
            content: content.trim().to_string(),
            interaction: None,
            payload: Value::Null,
            received_at: SystemTime::now(),
            responder,
        }
    }

    /// Attaches the platform message id.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Attaches the invoked interaction (slash command) name.
    pub fn with_interaction(mut self, name: impl Into<String>) -> Self {
        self.interaction = Some(name.into());
        self
    }

    /// Attaches the raw platform payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Overrides the receipt timestamp.
    pub fn with_received_at(mut self, at: SystemTime) -> Self {
        self.received_at = at;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn channel_id(&self) -> &str {
        &self.origin.channel_id
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.origin.guild_id.as_deref()
    }

    pub fn author_id(&self) -> &str {
        &self.origin.author_id
    }

    pub fn is_direct(&self) -> bool {
        self.origin.is_direct()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// The normalized (trimmed) text of the event. Empty for events without text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whitespace-delimited tokens of [`content`](Self::content).
    pub fn tokens(&self) -> Vec<&str> {
        self.content.split_whitespace().collect()
    }

    /// The invoked interaction name, for [`EventKind::INTERACTION`] events.
    pub fn interaction(&self) -> Option<&str> {
        self.interaction.as_deref()
    }

    /// The raw platform payload, or `Value::Null`.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    pub fn responder(&self) -> &BoxedResponder {
        &self.responder
    }

    /// Sends a reply to this event's origin.
    pub async fn reply(&self, reply: impl Into<Reply>) -> ApiResult<MessageId> {
        self.responder.reply(&self.origin, reply.into()).await
    }

    /// Deletes the message that triggered this event, if it has an id.
    pub async fn delete(&self) -> ApiResult<()> {
        match &self.message_id {
            Some(id) => self.responder.delete_message(&self.origin.channel_id, id).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("message_id", &self.message_id)
            .field("content", &self.content)
            .field("interaction", &self.interaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingResponder;

    #[test]
    fn test_kind_intersection() {
        assert!(EventKind::CREATE.accepted_by(EventKind::MESSAGES));
        assert!(EventKind::INTERACTION.accepted_by(EventKind::ALL));
        assert!(!EventKind::DELETE.accepted_by(EventKind::CREATE | EventKind::UPDATE));
    }

    #[test]
    fn test_direct_origin() {
        assert!(Origin::direct("c", "u").is_direct());
        assert!(!Origin::guild("c", "g", "u").is_direct());

        let empty_guild = Origin {
            channel_id: "c".into(),
            guild_id: Some(String::new()),
            author_id: "u".into(),
        };
        assert!(empty_guild.is_direct());
    }

    #[test]
    fn test_content_is_trimmed_and_tokenized() {
        let responder = RecordingResponder::shared();
        let event = Event::new(
            EventKind::CREATE,
            Origin::guild("1", "2", "3"),
            "  m?settings   test abc \n",
            responder,
        );
        assert_eq!(event.content(), "m?settings   test abc");
        assert_eq!(event.tokens(), vec!["m?settings", "test", "abc"]);
    }

    #[tokio::test]
    async fn test_reply_goes_to_origin() {
        let responder = RecordingResponder::new();
        let event = Event::new(
            EventKind::CREATE,
            Origin::guild("chan", "guild", "user"),
            "hi",
            responder.clone().boxed(),
        );

        event.reply("hello").await.unwrap();

        let sent = responder.replies();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.channel_id, "chan");
        assert_eq!(sent[0].1.as_text(), Some("hello"));
    }
}
