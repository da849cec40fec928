//! Multi-turn conversations.
//!
//! A handler that needs the user's next message registers a callback under a
//! conversation key (by convention `{channel-id}:{author-id}`). The
//! dispatcher pushes every subsequent `CREATE` event from that origin into
//! the callback's channel before generic processing continues.
//!
//! ```rust,ignore
//! let key = CallbackManager::key_for(ctx.event());
//! let mut callback = ctx.callbacks().make(&key)?;
//! ctx.reply("Pick a number").await?;
//!
//! match callback.next(Duration::from_secs(30)).await {
//!     Some(answer) => ctx.reply(format!("You picked {}", answer.content())).await?,
//!     None => ctx.reply("Timed out").await?,
//! };
//! // Dropping `callback` removes the registration.
//! ```
//!
//! The manager enforces no timeout of its own; waiting is bounded by the
//! handler through [`Callback::next`].
//!
//! Events for one conversation reach the receiver in the order
//! [`CallbackManager::deliver`] was called for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use bronze_core::Event;

use crate::error::{CallbackError, CallbackResult};

/// The sending half of a callback registration.
pub type CallbackSender = mpsc::Sender<Arc<Event>>;

struct Registration {
    id: u64,
    tx: CallbackSender,
    queue: Arc<DeliveryQueue>,
}

/// Ticket queue that serializes the sends for one registration.
struct DeliveryQueue {
    next: AtomicU64,
    serving: watch::Sender<u64>,
}

impl DeliveryQueue {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            serving: watch::Sender::new(0),
        }
    }

    fn ticket(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    async fn wait_turn(&self, ticket: u64) {
        let mut serving = self.serving.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = serving.wait_for(|now| *now == ticket).await;
    }

    fn advance(&self) {
        self.serving.send_modify(|now| *now += 1);
    }
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Registration>,
    next_id: u64,
}

/// Maps conversation keys to single-consumer event channels.
///
/// At most one registration per key exists at a time. Cloning is cheap and
/// clones share state.
#[derive(Clone, Default)]
pub struct CallbackManager {
    registry: Arc<Mutex<Registry>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the conventional conversation key for an origin.
    pub fn key(channel_id: &str, author_id: &str) -> String {
        format!("{channel_id}:{author_id}")
    }

    /// Builds the conversation key for the origin of `event`.
    pub fn key_for(event: &Event) -> String {
        Self::key(event.channel_id(), event.author_id())
    }

    /// Registers a fresh channel under `key`.
    ///
    /// Fails with [`CallbackError::AlreadyExists`] if `key` is taken; an
    /// existing conversation is never replaced.
    pub fn make(&self, key: impl Into<String>) -> CallbackResult<Callback> {
        let key = key.into();
        let mut registry = self.registry.lock();
        if registry.entries.contains_key(&key) {
            return Err(CallbackError::AlreadyExists(key));
        }

        registry.next_id += 1;
        let id = registry.next_id;
        let (tx, rx) = mpsc::channel(1);
        registry.entries.insert(
            key.clone(),
            Registration {
                id,
                tx,
                queue: Arc::new(DeliveryQueue::new()),
            },
        );
        debug!(key = %key, "Callback registered");

        Ok(Callback {
            key,
            id,
            rx,
            manager: Arc::downgrade(&self.registry),
        })
    }

    /// Returns the delivery channel registered under `key`.
    pub fn get(&self, key: &str) -> CallbackResult<CallbackSender> {
        self.registry
            .lock()
            .entries
            .get(key)
            .map(|r| r.tx.clone())
            .ok_or_else(|| CallbackError::NotFound(key.to_string()))
    }

    /// Removes the registration under `key`, closing its channel.
    ///
    /// Deleting an unregistered key does nothing.
    pub fn delete(&self, key: &str) {
        if self.registry.lock().entries.remove(key).is_some() {
            debug!(key = %key, "Callback deleted");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registry.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `event` for the callback registered for its origin.
    ///
    /// The send runs in a spawned task because it waits while the receiver
    /// still holds an undelivered event. Sends for the same registration
    /// complete in call order. Returns `false` if nothing is registered.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn deliver(&self, event: Arc<Event>) -> bool {
        let key = Self::key_for(&event);
        let (tx, queue, ticket) = {
            let registry = self.registry.lock();
            let Some(registration) = registry.entries.get(&key) else {
                return false;
            };
            let ticket = registration.queue.ticket();
            (
                registration.tx.clone(),
                Arc::clone(&registration.queue),
                ticket,
            )
        };

        trace!(key = %key, ticket, "Queued event for callback");
        tokio::spawn(async move {
            queue.wait_turn(ticket).await;
            if tx.send(event).await.is_err() {
                debug!(key = %key, "Callback closed before delivery");
            }
            queue.advance();
        });
        true
    }
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field("registered", &self.len())
            .finish()
    }
}

// ============================================================================
// Callback handle
// ============================================================================

/// The receiving side of a callback registration.
///
/// Dropping the handle deletes its registration, but never a newer one that
/// was made under the same key after this one was deleted.
pub struct Callback {
    key: String,
    id: u64,
    rx: mpsc::Receiver<Arc<Event>>,
    manager: Weak<Mutex<Registry>>,
}

impl Callback {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits for the next delivered event.
    ///
    /// Returns `None` if the registration was deleted.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Waits up to `timeout` for the next delivered event.
    ///
    /// Returns `None` on timeout or if the registration was deleted.
    pub async fn next(&mut self, timeout: Duration) -> Option<Arc<Event>> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Deletes the registration.
    pub fn close(self) {}
}

impl Drop for Callback {
    fn drop(&mut self) {
        let Some(registry) = self.manager.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        if registry
            .entries
            .get(&self.key)
            .is_some_and(|r| r.id == self.id)
        {
            registry.entries.remove(&self.key);
            debug!(key = %self.key, "Callback closed");
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::testing::RecordingResponder;
    use bronze_core::{EventKind, Origin};
    use tokio_test::{assert_err, assert_ok};

    fn event(channel: &str, author: &str, text: &str) -> Arc<Event> {
        Arc::new(Event::new(
            EventKind::CREATE,
            Origin::guild(channel, "g", author),
            text,
            RecordingResponder::shared(),
        ))
    }

    #[test]
    fn test_make_twice_fails() {
        let callbacks = CallbackManager::new();
        let _first = assert_ok!(callbacks.make("1:2"));
        let second = callbacks.make("1:2");
        assert_eq!(
            second.map(|_| ()),
            Err(CallbackError::AlreadyExists("1:2".into()))
        );
    }

    #[test]
    fn test_make_after_delete_succeeds() {
        let callbacks = CallbackManager::new();
        let first = assert_ok!(callbacks.make("1:2"));
        callbacks.delete("1:2");
        assert_ok!(callbacks.make("1:2"));
        drop(first);
    }

    #[test]
    fn test_get_missing_and_idempotent_delete() {
        let callbacks = CallbackManager::new();
        assert_eq!(
            callbacks.get("nope").map(|_| ()),
            Err(CallbackError::NotFound("nope".into()))
        );
        callbacks.delete("nope");
        callbacks.delete("nope");
        assert!(callbacks.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_reaches_callback() {
        let callbacks = CallbackManager::new();
        let mut callback = assert_ok!(callbacks.make(CallbackManager::key("c1", "u1")));

        assert!(callbacks.deliver(event("c1", "u1", "yes")));
        assert!(!callbacks.deliver(event("c1", "someone-else", "no")));

        let got = callback.next(Duration::from_secs(1)).await;
        assert_eq!(got.map(|e| e.content().to_string()).as_deref(), Some("yes"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deliveries_keep_call_order() {
        let callbacks = CallbackManager::new();
        let mut callback = assert_ok!(callbacks.make("c1:u1"));

        for n in 0..50 {
            assert!(callbacks.deliver(event("c1", "u1", &n.to_string())));
        }

        for n in 0..50 {
            let got = callback.next(Duration::from_secs(5)).await.unwrap();
            assert_eq!(got.content(), n.to_string());
        }
    }

    #[tokio::test]
    async fn test_delivery_after_close_is_dropped() {
        let callbacks = CallbackManager::new();
        let callback = assert_ok!(callbacks.make("c1:u1"));
        assert!(callbacks.deliver(event("c1", "u1", "first")));
        callback.close();

        assert!(!callbacks.deliver(event("c1", "u1", "second")));
        tokio::task::yield_now().await;
        assert!(callbacks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_times_out() {
        let callbacks = CallbackManager::new();
        let mut callback = assert_ok!(callbacks.make("c:u"));
        assert!(callback.next(Duration::from_secs(30)).await.is_none());
        assert!(callbacks.contains("c:u"));
    }

    #[tokio::test]
    async fn test_delete_closes_channel() {
        let callbacks = CallbackManager::new();
        let mut callback = assert_ok!(callbacks.make("c:u"));
        callbacks.delete("c:u");
        assert!(callback.recv().await.is_none());
    }

    #[test]
    fn test_drop_removes_only_own_registration() {
        let callbacks = CallbackManager::new();
        let stale = assert_ok!(callbacks.make("c:u"));
        callbacks.delete("c:u");
        let fresh = assert_ok!(callbacks.make("c:u"));

        drop(stale);
        assert!(callbacks.contains("c:u"));

        fresh.close();
        assert!(!callbacks.contains("c:u"));
        assert_err!(callbacks.get("c:u"));
    }
}
