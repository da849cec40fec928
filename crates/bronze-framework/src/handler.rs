//! Handler functions and the context they receive.
//!
//! Any `Fn(Context) -> impl Future<Output = HandlerResult>` is a handler:
//!
//! ```rust,ignore
//! async fn ping(ctx: Context) -> HandlerResult {
//!     ctx.reply("pong").await?;
//!     Ok(())
//! }
//!
//! let command = Command::new("ping").trigger(".ping").handler(ping);
//! ```
//!
//! Returning `Err` marks an expected failure: it is logged and published on
//! the bus, but the user gets no apology. Panics are caught at the dispatch
//! boundary and answered with one.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use bronze_core::{ApiResult, Event, MessageId, Reply};

use crate::bus::EventBus;
use crate::callback::{Callback, CallbackManager};
use crate::cooldown::CooldownManager;
use crate::error::CallbackResult;

pub use tower::BoxError;

/// What a handler returns.
pub type HandlerResult = Result<(), BoxError>;

/// A type-erased handler.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Conversion into a [`HandlerFn`].
///
/// Implemented for every async closure or function taking a [`Context`].
pub trait IntoHandler {
    fn into_handler(self) -> HandlerFn;
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_handler(self) -> HandlerFn {
        Arc::new(move |ctx: Context| (self)(ctx).boxed())
    }
}

/// Handler that does nothing; the default for builders without a handler.
pub(crate) fn noop_handler() -> HandlerFn {
    Arc::new(|_: Context| async { Ok::<(), BoxError>(()) }.boxed())
}

// ============================================================================
// Services
// ============================================================================

/// The dispatcher-owned state a handler may use.
#[derive(Clone, Default)]
pub(crate) struct Services {
    pub cooldowns: CooldownManager,
    pub callbacks: CallbackManager,
    pub bus: EventBus,
    pub owners: Arc<HashSet<String>>,
    /// Cancelled when the dispatcher stops listening.
    pub shutdown: CancellationToken,
}

// ============================================================================
// Context
// ============================================================================

/// Everything a handler gets for one invocation.
#[derive(Clone)]
pub struct Context {
    event: Arc<Event>,
    module: String,
    handler: String,
    args: Vec<String>,
    services: Services,
}

impl Context {
    pub(crate) fn new(
        event: Arc<Event>,
        module: impl Into<String>,
        handler: impl Into<String>,
        args: Vec<String>,
        services: Services,
    ) -> Self {
        Self {
            event,
            module: module.into(),
            handler: handler.into(),
            args,
            services,
        }
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    /// The full trimmed text of the triggering event.
    pub fn content(&self) -> &str {
        self.event.content()
    }

    /// Tokens following the matched trigger. Empty for passives and slash
    /// commands.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// The argument tokens joined with single spaces.
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }

    /// Name of the module the running handler belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Name of the running command, passive or slash command.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    pub fn cooldowns(&self) -> &CooldownManager {
        &self.services.cooldowns
    }

    pub fn callbacks(&self) -> &CallbackManager {
        &self.services.callbacks
    }

    pub fn bus(&self) -> &EventBus {
        &self.services.bus
    }

    /// Cancelled once the dispatcher stops taking new events. Long-running
    /// handlers should stop early when it fires.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.services.shutdown
    }

    /// Returns `true` if `user_id` is a bot owner.
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.services.owners.contains(user_id)
    }

    /// Returns `true` if the event author is a bot owner.
    pub fn author_is_owner(&self) -> bool {
        self.is_owner(self.event.author_id())
    }

    /// Replies to the origin of the triggering event.
    pub async fn reply(&self, reply: impl Into<Reply>) -> ApiResult<MessageId> {
        self.event.reply(reply).await
    }

    /// Registers a callback for the triggering event's origin.
    pub fn callback(&self) -> CallbackResult<Callback> {
        self.services
            .callbacks
            .make(CallbackManager::key_for(&self.event))
    }

    /// Waits up to `timeout` for the author's next message in this channel.
    ///
    /// Returns `Ok(None)` on timeout or shutdown. Fails if a conversation
    /// with this origin is already in progress.
    pub async fn wait_for_reply(&self, timeout: Duration) -> CallbackResult<Option<Arc<Event>>> {
        let mut callback = self.callback()?;
        tokio::select! {
            next = callback.next(timeout) => Ok(next),
            _ = self.services.shutdown.cancelled() => Ok(None),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("module", &self.module)
            .field("handler", &self.handler)
            .field("args", &self.args)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::testing::RecordingResponder;
    use bronze_core::{EventKind, Origin};

    fn context(owners: &[&str]) -> (Arc<RecordingResponder>, Context) {
        let responder = RecordingResponder::new();
        let event = Arc::new(Event::new(
            EventKind::CREATE,
            Origin::guild("c", "g", "u1"),
            ".say hello world",
            responder.clone().boxed(),
        ));
        let services = Services {
            owners: Arc::new(owners.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        };
        let ctx = Context::new(
            event,
            "fun",
            "say",
            vec!["hello".into(), "world".into()],
            services,
        );
        (responder, ctx)
    }

    #[tokio::test]
    async fn test_handler_runs_through_erased_fn() {
        let (responder, ctx) = context(&[]);
        let handler = (|ctx: Context| async move {
            ctx.reply(ctx.rest()).await?;
            Ok::<_, BoxError>(())
        })
        .into_handler();

        handler(ctx).await.unwrap();
        assert_eq!(responder.reply_texts(), vec!["hello world"]);
    }

    #[test]
    fn test_owner_checks() {
        let (_, ctx) = context(&["u1"]);
        assert!(ctx.author_is_owner());
        assert!(!ctx.is_owner("u2"));
        assert_eq!(ctx.arg(1), Some("world"));
        assert_eq!(ctx.arg(2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_reply_times_out_and_cleans_up() {
        let (_, ctx) = context(&[]);
        let got = ctx.wait_for_reply(Duration::from_secs(5)).await.unwrap();
        assert!(got.is_none());
        assert!(ctx.callbacks().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_reply_ends_on_shutdown() {
        let (_, ctx) = context(&[]);
        ctx.shutdown().cancel();
        let got = ctx.wait_for_reply(Duration::from_secs(3600)).await.unwrap();
        assert!(got.is_none());
        assert!(ctx.callbacks().is_empty());
    }
}
