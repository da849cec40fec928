//! Failure-isolated handler execution.
//!
//! Every handler body runs behind `catch_unwind`, so a panic ends that one
//! invocation and nothing else. Each run is reported on the bus and in the
//! log; a panicking command also gets the apology reply.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::bus::EventBus;
use crate::handler::{Context, HandlerFn};
use crate::lifecycle::{
    CommandErrored, CommandPanicked, CommandRan, PassiveErrored, PassivePanicked, PassiveRan,
};

/// How a handler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Returned `Ok` after the given time.
    Ran(Duration),
    /// Returned `Err` with the given message.
    Errored(String),
    /// Panicked with the given reason.
    Panicked(String),
}

/// Runs `handler`, converting a panic into [`HandlerOutcome::Panicked`].
///
/// Waits for a permit first when `permits` is set.
pub(crate) async fn run_guarded(
    handler: &HandlerFn,
    ctx: Context,
    permits: Option<&Semaphore>,
) -> HandlerOutcome {
    let _permit = match permits {
        Some(semaphore) => match semaphore.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => return HandlerOutcome::Errored("handler pool closed".into()),
        },
        None => None,
    };

    let started = Instant::now();
    // The call itself sits inside the guarded future so a panic before the
    // first await is caught as well.
    let guarded = AssertUnwindSafe(async move { handler(ctx).await }).catch_unwind();
    match guarded.await {
        Ok(Ok(())) => HandlerOutcome::Ran(started.elapsed()),
        Ok(Err(err)) => HandlerOutcome::Errored(err.to_string()),
        Err(payload) => HandlerOutcome::Panicked(panic_reason(payload.as_ref())),
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs a command or slash command and reports the outcome.
///
/// On panic the origin receives `apology`; a failure to send it is only
/// logged.
pub(crate) async fn run_command(
    handler: &HandlerFn,
    ctx: Context,
    bus: &EventBus,
    apology: &str,
    permits: Option<&Semaphore>,
) -> HandlerOutcome {
    let event = ctx.event().clone();
    let module = ctx.module().to_string();
    let command = ctx.handler_name().to_string();

    let outcome = run_guarded(handler, ctx, permits).await;
    match &outcome {
        HandlerOutcome::Ran(elapsed) => {
            debug!(module = %module, command = %command, elapsed = ?elapsed, "Command ran");
            bus.emit(CommandRan {
                module,
                command,
                event,
                elapsed: *elapsed,
            });
        }
        HandlerOutcome::Errored(message) => {
            warn!(module = %module, command = %command, error = %message, "Command failed");
            bus.emit(CommandErrored {
                module,
                command,
                event,
                error: message.clone(),
            });
        }
        HandlerOutcome::Panicked(reason) => {
            error!(
                module = %module,
                command = %command,
                channel = %event.channel_id(),
                author = %event.author_id(),
                reason = %reason,
                "Command panicked"
            );
            if let Err(err) = event.reply(apology).await {
                warn!(module = %module, command = %command, error = %err, "Failed to send apology");
            }
            bus.emit(CommandPanicked {
                module,
                command,
                event,
                reason: reason.clone(),
            });
        }
    }
    outcome
}

/// Runs a passive and reports the outcome. Never replies to the origin.
pub(crate) async fn run_passive(
    handler: &HandlerFn,
    ctx: Context,
    bus: &EventBus,
    permits: Option<&Semaphore>,
) -> HandlerOutcome {
    let event = ctx.event().clone();
    let module = ctx.module().to_string();
    let passive = ctx.handler_name().to_string();

    let outcome = run_guarded(handler, ctx, permits).await;
    match &outcome {
        HandlerOutcome::Ran(elapsed) => {
            debug!(module = %module, passive = %passive, elapsed = ?elapsed, "Passive ran");
            bus.emit(PassiveRan {
                module,
                passive,
                event,
                elapsed: *elapsed,
            });
        }
        HandlerOutcome::Errored(message) => {
            warn!(module = %module, passive = %passive, error = %message, "Passive failed");
            bus.emit(PassiveErrored {
                module,
                passive,
                event,
                error: message.clone(),
            });
        }
        HandlerOutcome::Panicked(reason) => {
            error!(module = %module, passive = %passive, reason = %reason, "Passive panicked");
            bus.emit(PassivePanicked {
                module,
                passive,
                event,
                reason: reason.clone(),
            });
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bronze_core::testing::RecordingResponder;
    use bronze_core::{Event, EventKind, Origin};
    use tokio::sync::mpsc;

    use crate::handler::{BoxError, IntoHandler, Services};

    fn ctx(responder: &Arc<RecordingResponder>, bus: &EventBus) -> Context {
        let event = Arc::new(Event::new(
            EventKind::CREATE,
            Origin::guild("c", "g", "u"),
            ".boom",
            responder.clone().boxed(),
        ));
        let services = Services {
            bus: bus.clone(),
            ..Default::default()
        };
        Context::new(event, "test", "boom", Vec::new(), services)
    }

    #[test]
    fn test_panic_reason() {
        assert_eq!(panic_reason(&"static"), "static");
        assert_eq!(panic_reason(&String::from("owned")), "owned");
        assert_eq!(panic_reason(&42_u8), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_command_panic_is_caught_and_apologized() {
        let responder = RecordingResponder::new();
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(move |p: Arc<CommandPanicked>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(p.reason.clone());
            }
        });

        let handler = (|ctx: Context| async move {
            if ctx.content() == ".boom" {
                panic!("kaboom");
            }
            Ok::<_, BoxError>(())
        })
        .into_handler();

        let outcome = run_command(&handler, ctx(&responder, &bus), &bus, "sorry", None).await;
        assert_eq!(outcome, HandlerOutcome::Panicked("kaboom".into()));
        assert_eq!(responder.reply_texts(), vec!["sorry"]);
        assert_eq!(rx.recv().await.as_deref(), Some("kaboom"));
    }

    #[tokio::test]
    async fn test_command_error_is_not_apologized() {
        let responder = RecordingResponder::new();
        let bus = EventBus::new();
        let handler = (|_: Context| async move { Err::<(), BoxError>("nope".into()) }).into_handler();

        let outcome = run_command(&handler, ctx(&responder, &bus), &bus, "sorry", None).await;
        assert_eq!(outcome, HandlerOutcome::Errored("nope".into()));
        assert!(responder.replies().is_empty());
    }

    #[tokio::test]
    async fn test_passive_panic_is_silent() {
        let responder = RecordingResponder::new();
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(move |p: Arc<PassivePanicked>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(p.passive.clone());
            }
        });

        let handler = (|ctx: Context| async move {
            if ctx.content() == ".boom" {
                std::panic::panic_any(7_u32);
            }
            Ok::<_, BoxError>(())
        })
        .into_handler();

        let outcome = run_passive(&handler, ctx(&responder, &bus), &bus, None).await;
        assert_eq!(
            outcome,
            HandlerOutcome::Panicked("unknown panic payload".into())
        );
        assert!(responder.replies().is_empty());
        assert_eq!(rx.recv().await.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_permits_bound_concurrency() {
        let responder = RecordingResponder::new();
        let bus = EventBus::new();
        let permits = Semaphore::new(0);
        let handler = (|_: Context| async move { Ok::<_, BoxError>(()) }).into_handler();

        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            run_guarded(&handler, ctx(&responder, &bus), Some(&permits)),
        )
        .await;
        assert!(blocked.is_err());

        permits.add_permits(1);
        let outcome = run_guarded(&handler, ctx(&responder, &bus), Some(&permits)).await;
        assert!(matches!(outcome, HandlerOutcome::Ran(_)));
    }
}
