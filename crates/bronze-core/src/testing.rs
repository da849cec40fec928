//! Test doubles for code built on the Bronze core.
//!
//! [`RecordingResponder`] stands in for a real platform client: it records
//! every reply and deletion and answers permission queries from a
//! configurable table.
//!
//! ```rust,ignore
//! let responder = RecordingResponder::new();
//! responder.set_author_permissions("user-1", Permissions::BAN_MEMBERS);
//!
//! let event = Event::new(EventKind::CREATE, origin, ".ban @x", responder.clone().boxed());
//! dispatcher.handle(event).await;
//!
//! assert_eq!(responder.reply_texts(), vec!["banned"]);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ApiError, ApiResult};
use crate::event::Origin;
use crate::permissions::Permissions;
use crate::responder::{BoxedResponder, MessageId, Reply, Responder};

#[derive(Default)]
struct Recorded {
    replies: Vec<(Origin, Reply)>,
    deleted: Vec<(String, String)>,
    author_permissions: HashMap<String, Permissions>,
    default_permissions: Permissions,
    bot_permissions: Permissions,
    fail_replies: bool,
    next_id: u64,
}

/// A [`Responder`] that records calls instead of reaching a platform.
///
/// Authors without an explicit entry get the default permissions (empty
/// unless changed); the bot holds every permission unless changed.
pub struct RecordingResponder {
    state: Mutex<Recorded>,
}

impl RecordingResponder {
    /// Creates a responder with empty author permissions and a fully
    /// privileged bot.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Recorded {
                bot_permissions: Permissions::all(),
                ..Default::default()
            }),
        })
    }

    /// Creates a responder and erases its type in one step.
    pub fn shared() -> BoxedResponder {
        Self::new()
    }

    /// Erases the concrete type.
    pub fn boxed(self: Arc<Self>) -> BoxedResponder {
        self
    }

    pub fn set_author_permissions(&self, author_id: impl Into<String>, perms: Permissions) {
        self.state
            .lock()
            .author_permissions
            .insert(author_id.into(), perms);
    }

    pub fn set_default_permissions(&self, perms: Permissions) {
        self.state.lock().default_permissions = perms;
    }

    pub fn set_bot_permissions(&self, perms: Permissions) {
        self.state.lock().bot_permissions = perms;
    }

    /// Makes every subsequent `reply` call fail with [`ApiError::NotConnected`].
    pub fn fail_replies(&self, fail: bool) {
        self.state.lock().fail_replies = fail;
    }

    /// All replies sent so far, in order.
    pub fn replies(&self) -> Vec<(Origin, Reply)> {
        self.state.lock().replies.clone()
    }

    /// Text bodies of all text replies sent so far, in order.
    pub fn reply_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .replies
            .iter()
            .filter_map(|(_, reply)| reply.as_text().map(str::to_string))
            .collect()
    }

    /// `(channel_id, message_id)` pairs of deleted messages.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state.lock().deleted.clone()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn reply(&self, origin: &Origin, reply: Reply) -> ApiResult<MessageId> {
        let mut state = self.state.lock();
        if state.fail_replies {
            return Err(ApiError::NotConnected);
        }
        state.next_id += 1;
        state.replies.push((origin.clone(), reply));
        Ok(format!("recorded-{}", state.next_id))
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> ApiResult<()> {
        self.state
            .lock()
            .deleted
            .push((channel_id.to_string(), message_id.to_string()));
        Ok(())
    }

    async fn author_permissions(&self, origin: &Origin) -> ApiResult<Permissions> {
        let state = self.state.lock();
        Ok(state
            .author_permissions
            .get(&origin.author_id)
            .copied()
            .unwrap_or(state.default_permissions))
    }

    async fn bot_permissions(&self, _channel_id: &str) -> ApiResult<Permissions> {
        Ok(self.state.lock().bot_permissions)
    }
}
