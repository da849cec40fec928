//! Bus observers installed by the runtime.
//!
//! [`LifecycleLogger`] writes one `info` line per finished handler under the
//! `bronze::lifecycle` target, which makes it easy to route command usage
//! to its own file with a filter directive.

use std::sync::Arc;

use bronze_framework::{
    CommandErrored, CommandPanicked, CommandRan, EventBus, PassiveErrored, PassivePanicked,
    PassiveRan, SubscriptionId,
};
use tracing::info;

/// Turns lifecycle notifications into log lines.
#[derive(Debug)]
pub struct LifecycleLogger {
    bus: EventBus,
    subscriptions: Vec<SubscriptionId>,
}

impl LifecycleLogger {
    /// Subscribes to every lifecycle event on `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let subscriptions = vec![
            bus.subscribe(|e: Arc<CommandRan>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    command = %e.command,
                    channel = %e.event.channel_id(),
                    author = %e.event.author_id(),
                    elapsed_ms = e.elapsed.as_millis() as u64,
                    outcome = "ok",
                    "command finished"
                );
            }),
            bus.subscribe(|e: Arc<CommandErrored>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    command = %e.command,
                    channel = %e.event.channel_id(),
                    author = %e.event.author_id(),
                    error = %e.error,
                    outcome = "error",
                    "command finished"
                );
            }),
            bus.subscribe(|e: Arc<CommandPanicked>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    command = %e.command,
                    channel = %e.event.channel_id(),
                    author = %e.event.author_id(),
                    reason = %e.reason,
                    outcome = "panic",
                    "command finished"
                );
            }),
            bus.subscribe(|e: Arc<PassiveRan>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    passive = %e.passive,
                    channel = %e.event.channel_id(),
                    elapsed_ms = e.elapsed.as_millis() as u64,
                    outcome = "ok",
                    "passive finished"
                );
            }),
            bus.subscribe(|e: Arc<PassiveErrored>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    passive = %e.passive,
                    channel = %e.event.channel_id(),
                    error = %e.error,
                    outcome = "error",
                    "passive finished"
                );
            }),
            bus.subscribe(|e: Arc<PassivePanicked>| async move {
                info!(
                    target: "bronze::lifecycle",
                    module = %e.module,
                    passive = %e.passive,
                    channel = %e.event.channel_id(),
                    reason = %e.reason,
                    outcome = "panic",
                    "passive finished"
                );
            }),
        ];

        Self {
            bus: bus.clone(),
            subscriptions,
        }
    }

    /// Number of live subscriptions held by this logger.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Removes every subscription made by [`attach`](Self::attach).
    pub fn detach(mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_and_detach() {
        let bus = EventBus::new();
        let logger = LifecycleLogger::attach(&bus);
        assert_eq!(logger.subscription_count(), 6);
        assert_eq!(bus.subscriber_count::<CommandRan>(), 1);
        assert_eq!(bus.subscriber_count::<PassivePanicked>(), 1);

        logger.detach();
        assert_eq!(bus.subscriber_count::<CommandRan>(), 0);
        assert_eq!(bus.subscriber_count::<PassivePanicked>(), 0);
    }
}
