//! Typed in-process publish/subscribe.
//!
//! The [`EventBus`] decouples the dispatcher from whatever wants to observe
//! it. Subscribers register for a concrete payload type; emitting a value of
//! that type notifies each of them in its own task, so a slow subscriber
//! never delays the others or the emitter.
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//!
//! bus.subscribe(|ran: Arc<CommandRan>| async move {
//!     println!("{} took {:?}", ran.command, ran.elapsed);
//! });
//!
//! bus.subscribe_once(|_: Arc<CommandPanicked>| async move {
//!     println!("first panic seen");
//! });
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{trace, warn};
use uuid::Uuid;

type Payload = Arc<dyn Any + Send + Sync>;
type SubscriberFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Subscriber {
    id: SubscriptionId,
    once: bool,
    handler: SubscriberFn,
}

/// Publish/subscribe keyed by payload type.
///
/// Cloning is cheap and clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<TypeId, Vec<Subscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to every emitted `E`.
    pub fn subscribe<E, F, Fut>(&self, handler: F) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert::<E, F, Fut>(handler, false)
    }

    /// Subscribes `handler` to the next emitted `E` only.
    pub fn subscribe_once<E, F, Fut>(&self, handler: F) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert::<E, F, Fut>(handler, true)
    }

    fn insert<E, F, Fut>(&self, handler: F, once: bool) -> SubscriptionId
    where
        E: Any + Send + Sync,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let handler: SubscriberFn = Arc::new(move |payload: Payload| match payload.downcast::<E>() {
            Ok(event) => handler(event).boxed(),
            Err(_) => async {}.boxed(),
        });

        self.subscribers
            .lock()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscriber { id, once, handler });

        trace!(event = type_name::<E>(), id = %id, once, "Subscribed");
        id
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        for list in subscribers.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of subscribers for `E`.
    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.subscribers
            .lock()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Notifies every subscriber of `E`, each in its own task.
    ///
    /// Single-fire subscribers are removed before their task starts.
    /// Returns the number of subscribers notified. Outside a Tokio runtime
    /// nothing is delivered.
    pub fn emit<E: Any + Send + Sync>(&self, event: E) -> usize {
        let Ok(runtime) = Handle::try_current() else {
            warn!(event = type_name::<E>(), "No Tokio runtime, event dropped");
            return 0;
        };

        let handlers: Vec<SubscriberFn> = {
            let mut subscribers = self.subscribers.lock();
            let Some(list) = subscribers.get_mut(&TypeId::of::<E>()) else {
                return 0;
            };
            let handlers = list.iter().map(|s| Arc::clone(&s.handler)).collect();
            list.retain(|s| !s.once);
            handlers
        };

        let payload: Payload = Arc::new(event);
        for handler in &handlers {
            runtime.spawn(handler(Arc::clone(&payload)));
        }

        trace!(event = type_name::<E>(), notified = handlers.len(), "Emitted");
        handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.lock();
        f.debug_struct("EventBus")
            .field("types", &subscribers.len())
            .field(
                "subscribers",
                &subscribers.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}
