//! The dispatcher: routes events to modules and runs their handlers.
//!
//! # Dispatch pass
//!
//! For every event:
//!
//! 1. A `CREATE` event is pushed to the callback registered for its
//!    `{channel}:{author}` key, if any, in its own task.
//! 2. Every module that accepts the event, in registration order:
//!    - starts each eligible passive in its own task;
//!    - if the event has text, selects the first eligible command whose
//!      trigger matches, and runs it after the owner, permission and
//!      cooldown checks;
//!    - if the event is an interaction, does the same for the slash command
//!      it names.
//!
//! Handlers run concurrently with no ordering between them. A panic in one
//! is caught at the boundary (see [`runner`](crate::runner)) and never
//! reaches the loop.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(DispatcherConfig::default().owner("1234"));
//! dispatcher.register_module(fun_module())?;
//!
//! let (tx, rx) = mpsc::channel(256);
//! let token = CancellationToken::new();
//! tokio::spawn(dispatcher.clone().listen(rx, token.clone()));
//! ```

use std::collections::HashSet;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use bronze_core::{Event, EventKind};

use crate::bus::EventBus;
use crate::callback::CallbackManager;
use crate::command::Command;
use crate::cooldown::{CooldownManager, CooldownScope};
use crate::error::{RegistryError, RegistryResult};
use crate::handler::{Context, HandlerFn, Services};
use crate::module::Module;
use crate::policy::{self, Gated, Rejection};
use crate::runner::{self, HandlerOutcome};
use crate::slash::SlashCommand;

// ============================================================================
// Configuration
// ============================================================================

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// User ids allowed to run owner-only commands.
    pub owners: Vec<String>,
    /// Also require the bot itself to hold a command's permissions.
    pub check_bot_permissions: bool,
    /// Upper bound on concurrently running handler bodies; 0 is unbounded.
    pub max_concurrent_handlers: usize,
    /// Reply sent when a command panics.
    pub apology_message: String,
    /// Reply sent when a command is on cooldown. `{remaining}` is replaced
    /// with the remaining time.
    pub cooldown_message: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            check_bot_permissions: true,
            max_concurrent_handlers: 0,
            apology_message: "Sorry, something went wrong while running that command.".into(),
            cooldown_message: "This command is on cooldown. Try again in {remaining}.".into(),
        }
    }
}

impl DispatcherConfig {
    pub fn owner(mut self, id: impl Into<String>) -> Self {
        self.owners.push(id.into());
        self
    }

    pub fn check_bot_permissions(mut self, check: bool) -> Self {
        self.check_bot_permissions = check;
        self
    }

    pub fn max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max;
        self
    }

    pub fn apology_message(mut self, message: impl Into<String>) -> Self {
        self.apology_message = message.into();
        self
    }

    pub fn cooldown_message(mut self, message: impl Into<String>) -> Self {
        self.cooldown_message = message.into();
        self
    }

    fn render_cooldown(&self, remaining: Duration) -> String {
        self.cooldown_message
            .replace("{remaining}", &format_remaining(remaining))
    }
}

/// Formats a remaining cooldown for humans: `"4.2s"`, `"2m 5s"`.
///
/// Sub-minute values round up to the next tenth, so an active cooldown
/// never reads `"0.0s"`.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let tenths = remaining.as_millis().div_ceil(100).max(1);
        format!("{}.{}s", tenths / 10, tenths % 10)
    }
}

// ============================================================================
// Report
// ============================================================================

/// What happened to a matched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The handler ran to the given outcome.
    Executed(HandlerOutcome),
    /// The command was on cooldown; a notice was sent.
    OnCooldown(Duration),
    /// Owner or permission checks failed; nothing was sent.
    Rejected(Rejection),
}

/// A command selected during a dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub module: String,
    pub command: String,
    pub status: CommandStatus,
}

/// The result of [`Dispatcher::handle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Names of the modules that accepted the event.
    pub modules: Vec<String>,
    /// Whether a callback was registered for the event's origin.
    pub callback_delivered: bool,
    /// Outcomes of the passives that ran, in start order.
    pub passives: Vec<(String, HandlerOutcome)>,
    /// Commands and slash commands that were selected, one per module at
    /// most.
    pub commands: Vec<CommandReport>,
}

impl DispatchReport {
    /// The first selected command, if any.
    pub fn command(&self) -> Option<&CommandReport> {
        self.commands.first()
    }

    /// Returns `true` if no module accepted the event.
    pub fn is_ignored(&self) -> bool {
        self.modules.is_empty()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct Inner {
    modules: RwLock<Vec<Arc<Module>>>,
    services: Services,
    config: DispatcherConfig,
    permits: Option<Semaphore>,
}

/// Owns the module registry and the shared managers, and routes events.
///
/// Cloning is cheap; clones share everything. Independent instances share
/// nothing, so several bots can live in one process.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let owners: HashSet<String> = config.owners.iter().cloned().collect();
        let permits = (config.max_concurrent_handlers > 0)
            .then(|| Semaphore::new(config.max_concurrent_handlers));

        Self {
            inner: Arc::new(Inner {
                modules: RwLock::new(Vec::new()),
                services: Services {
                    cooldowns: CooldownManager::new(),
                    callbacks: CallbackManager::new(),
                    bus: EventBus::new(),
                    owners: Arc::new(owners),
                    shutdown: CancellationToken::new(),
                },
                config,
                permits,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Registers a module. Fails if a module with the same name exists or
    /// the module is unnamed.
    pub fn register_module(&self, module: Module) -> RegistryResult<()> {
        if module.name().trim().is_empty() {
            return Err(RegistryError::EmptyName { what: "module" });
        }

        let mut modules = self.inner.modules.write();
        if modules.iter().any(|m| m.name() == module.name()) {
            return Err(RegistryError::DuplicateModule {
                name: module.name().to_string(),
            });
        }

        info!(
            module = %module.name(),
            commands = module.commands().len(),
            passives = module.passives().len(),
            slash_commands = module.slash_commands().len(),
            "Module registered"
        );
        modules.push(Arc::new(module));
        Ok(())
    }

    pub fn module(&self, name: &str) -> RegistryResult<Arc<Module>> {
        self.inner
            .modules
            .read()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::ModuleNotFound(name.to_string()))
    }

    /// Registered modules in registration order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner.modules.read().clone()
    }

    /// Enables or disables a command at runtime.
    pub fn set_command_enabled(
        &self,
        module: &str,
        command: &str,
        enabled: bool,
    ) -> RegistryResult<()> {
        let found = self.module(module)?;
        let target = found
            .command(command)
            .ok_or_else(|| RegistryError::CommandNotFound {
                module: module.to_string(),
                command: command.to_string(),
            })?;
        target.set_enabled(enabled);
        info!(module = %module, command = %command, enabled, "Command toggled");
        Ok(())
    }

    /// Enables or disables a passive at runtime.
    pub fn set_passive_enabled(
        &self,
        module: &str,
        passive: &str,
        enabled: bool,
    ) -> RegistryResult<()> {
        let found = self.module(module)?;
        let target = found
            .passive(passive)
            .ok_or_else(|| RegistryError::PassiveNotFound {
                module: module.to_string(),
                passive: passive.to_string(),
            })?;
        target.set_enabled(enabled);
        info!(module = %module, passive = %passive, enabled, "Passive toggled");
        Ok(())
    }

    /// Enables or disables a slash command at runtime.
    pub fn set_slash_command_enabled(
        &self,
        module: &str,
        command: &str,
        enabled: bool,
    ) -> RegistryResult<()> {
        let found = self.module(module)?;
        let target = found
            .slash_command(command)
            .ok_or_else(|| RegistryError::CommandNotFound {
                module: module.to_string(),
                command: command.to_string(),
            })?;
        target.set_enabled(enabled);
        info!(module = %module, slash = %command, enabled, "Slash command toggled");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Shared state
    // ------------------------------------------------------------------------

    pub fn cooldowns(&self) -> &CooldownManager {
        &self.inner.services.cooldowns
    }

    pub fn callbacks(&self) -> &CallbackManager {
        &self.inner.services.callbacks
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.services.bus
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.inner.services.owners.contains(user_id)
    }

    /// Token handed to handlers through [`Context::shutdown`]. Cancelled
    /// when [`listen`](Self::listen) returns.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.services.shutdown
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Consumes events from `events` until it closes or `shutdown` fires.
    ///
    /// Each event is handed to [`dispatch`](Self::dispatch) and the loop
    /// moves on immediately. Cancellation stops the loop before the next
    /// event; handlers already running are left to finish, but see
    /// [`shutdown_token`](Self::shutdown_token).
    pub async fn listen(self, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        info!(modules = self.inner.modules.read().len(), "Dispatcher listening");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Dispatcher stopped by shutdown signal");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => {
                        info!("Event source closed, dispatcher stopping");
                        break;
                    }
                },
            }
        }
        self.inner.services.shutdown.cancel();
    }

    /// Runs [`handle`](Self::handle) in a new task.
    ///
    /// Callback delivery is queued before the task is spawned, so a
    /// conversation receives events in the order they were dispatched.
    pub fn dispatch(&self, event: Event) -> JoinHandle<DispatchReport> {
        let event = Arc::new(event);
        let delivered = self.deliver_callback(&event);
        let this = self.clone();
        tokio::spawn(async move { this.handle_shared(event, delivered).await })
    }

    /// Processes one event and waits for every handler it started.
    ///
    /// Callback delivery is queued but not awaited, since it waits on the
    /// conversation's receiver.
    pub async fn handle(&self, event: Event) -> DispatchReport {
        let event = Arc::new(event);
        let delivered = self.deliver_callback(&event);
        self.handle_shared(event, delivered).await
    }

    async fn handle_shared(&self, event: Arc<Event>, delivered: bool) -> DispatchReport {
        let span = debug_span!(
            "dispatch",
            kind = ?event.kind(),
            channel = %event.channel_id(),
            author = %event.author_id(),
        );
        self.handle_inner(event, delivered).instrument(span).await
    }

    async fn handle_inner(&self, event: Arc<Event>, delivered: bool) -> DispatchReport {
        let mut report = DispatchReport {
            callback_delivered: delivered,
            ..Default::default()
        };

        let tokens: Vec<String> = event.tokens().into_iter().map(str::to_string).collect();
        let mut passives = Vec::new();
        let mut commands = Vec::new();

        for module in self.modules() {
            if let Err(rejection) = policy::filter(module.as_ref(), &event) {
                trace!(module = %module.name(), reason = %rejection, "Module skipped");
                continue;
            }
            report.modules.push(module.name().to_string());

            for passive in module.passives_for(&event) {
                let name = passive.name().to_string();
                let handler = passive.handler_fn().clone();
                let ctx = self.context(&event, module.name(), &name, Vec::new());
                let this = self.clone();
                passives.push((
                    name,
                    tokio::spawn(async move {
                        runner::run_passive(&handler, ctx, this.bus(), this.permits()).await
                    }),
                ));
            }

            if !tokens.is_empty() {
                let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
                if let Some((command, trigger)) = module.find_command(&event, &refs) {
                    let args = tokens[trigger.len()..].to_vec();
                    commands.push(self.spawn_command(&event, &module, command, args));
                }
            }

            if event.kind().accepted_by(EventKind::INTERACTION)
                && let Some(slash) = module.find_slash_command(&event)
            {
                commands.push(self.spawn_slash_command(&event, &module, slash));
            }
        }

        if report.modules.is_empty() {
            trace!("No module accepted the event");
        }

        for (name, task) in passives {
            let outcome = task
                .await
                .unwrap_or_else(|err| HandlerOutcome::Panicked(err.to_string()));
            report.passives.push((name, outcome));
        }
        for task in commands {
            match task.await {
                Ok(command) => report.commands.push(command),
                Err(err) => warn!(error = %err, "Command task failed"),
            }
        }

        report
    }

    /// Queues delivery to the origin's callback. Returns `true` if one was
    /// registered.
    fn deliver_callback(&self, event: &Arc<Event>) -> bool {
        event.kind().accepted_by(EventKind::CREATE) && self.callbacks().deliver(Arc::clone(event))
    }

    fn spawn_command(
        &self,
        event: &Arc<Event>,
        module: &Module,
        command: &Arc<Command>,
        args: Vec<String>,
    ) -> JoinHandle<CommandReport> {
        let (cooldown, scope) = command.get_cooldown();
        let gate = Arc::clone(command);
        let handler = command.handler_fn().clone();
        let ctx = self.context(event, module.name(), command.name(), args);
        self.spawn_gated(ctx, gate, handler, cooldown, scope)
    }

    fn spawn_slash_command(
        &self,
        event: &Arc<Event>,
        module: &Module,
        slash: &Arc<SlashCommand>,
    ) -> JoinHandle<CommandReport> {
        let (cooldown, scope) = slash.get_cooldown();
        let gate = Arc::clone(slash);
        let handler = slash.handler_fn().clone();
        let ctx = self.context(event, module.name(), slash.name(), Vec::new());
        self.spawn_gated(ctx, gate, handler, cooldown, scope)
    }

    /// Authorizes, applies the cooldown and runs a command in a new task.
    fn spawn_gated<G>(
        &self,
        ctx: Context,
        gate: Arc<G>,
        handler: HandlerFn,
        cooldown: Duration,
        scope: CooldownScope,
    ) -> JoinHandle<CommandReport>
    where
        G: Gated + Send + Sync + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let event = Arc::clone(ctx.event());
            let module = ctx.module().to_string();
            let command = ctx.handler_name().to_string();
            let config = &this.inner.config;

            let status = 'status: {
                if let Err(rejection) = policy::authorize(
                    gate.as_ref(),
                    &event,
                    &this.inner.services.owners,
                    config.check_bot_permissions,
                )
                .await
                {
                    debug!(module = %module, command = %command, reason = %rejection, "Command rejected");
                    break 'status CommandStatus::Rejected(rejection);
                }

                if let Some(key) = scope.key(&event, &command)
                    && let Some(remaining) = this.cooldowns().try_set(key, cooldown)
                {
                    debug!(module = %module, command = %command, remaining = ?remaining, "Command on cooldown");
                    if let Err(err) = event.reply(config.render_cooldown(remaining)).await {
                        warn!(module = %module, command = %command, error = %err, "Failed to send cooldown notice");
                    }
                    break 'status CommandStatus::OnCooldown(remaining);
                }

                let outcome = runner::run_command(
                    &handler,
                    ctx,
                    this.bus(),
                    &config.apology_message,
                    this.permits(),
                )
                .await;
                CommandStatus::Executed(outcome)
            };

            CommandReport {
                module,
                command,
                status,
            }
        })
    }

    fn context(&self, event: &Arc<Event>, module: &str, handler: &str, args: Vec<String>) -> Context {
        Context::new(
            Arc::clone(event),
            module,
            handler,
            args,
            self.inner.services.clone(),
        )
    }

    fn permits(&self) -> Option<&Semaphore> {
        self.inner.permits.as_ref()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("modules", &self.inner.modules.read().len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tower integration
// ============================================================================

impl tower::Service<Event> for Dispatcher {
    type Response = DispatchReport;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchReport, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: Event) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.handle(event).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bronze_core::testing::RecordingResponder;
    use bronze_core::{Origin, Permissions};
    use tokio_test::assert_ok;
    use tower::ServiceExt;

    use crate::handler::BoxError;
    use crate::lifecycle::CommandPanicked;
    use crate::passive::Passive;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(Context) -> futures::future::Ready<Result<(), BoxError>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        }
    }

    fn message(responder: &Arc<RecordingResponder>, origin: Origin, text: &str) -> Event {
        Event::new(EventKind::CREATE, origin, text, responder.clone().boxed())
    }

    fn guild(channel: &str) -> Origin {
        Origin::guild(channel, "g1", "u1")
    }

    #[tokio::test]
    async fn test_duplicate_module_rejected() {
        let dispatcher = Dispatcher::default();
        assert_ok!(dispatcher.register_module(Module::new("fun")));
        assert_eq!(
            dispatcher.register_module(Module::new("fun")),
            Err(RegistryError::DuplicateModule { name: "fun".into() })
        );
        assert_eq!(dispatcher.modules().len(), 1);
        assert!(matches!(
            dispatcher.module("nope"),
            Err(RegistryError::ModuleNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_scenario() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("test")
                    .with_command(
                        Command::new("test")
                            .trigger(".test")
                            .cooldown(Duration::from_secs(5), CooldownScope::Channel)
                            .handler(counting(&hits)),
                    )
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let first = dispatcher.handle(message(&responder, guild("1"), ".test")).await;
        assert!(matches!(
            first.command().unwrap().status,
            CommandStatus::Executed(HandlerOutcome::Ran(_))
        ));

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = dispatcher.handle(message(&responder, guild("1"), ".test")).await;
        assert!(matches!(
            second.command().unwrap().status,
            CommandStatus::OnCooldown(_)
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(responder.reply_texts().len(), 1);
        assert!(responder.reply_texts()[0].contains("cooldown"));

        // Another channel has its own key.
        dispatcher.handle(message(&responder, guild("2"), ".test")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        dispatcher.handle(message(&responder, guild("1"), ".test")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dm_gating_requires_both_flags() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("closed")
                    .allow_dms(false)
                    .with_command(Command::new("a").trigger(".a").allow_dms(true).handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();
        dispatcher
            .register_module(
                Module::new("open")
                    .allow_dms(true)
                    .with_command(Command::new("b").trigger(".b").handler(counting(&hits)))
                    .unwrap()
                    .with_command(Command::new("c").trigger(".c").allow_dms(true).handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let dm = |text: &str| message(&responder, Origin::direct("d", "u1"), text);

        assert!(dispatcher.handle(dm(".a")).await.command().is_none());
        assert!(dispatcher.handle(dm(".b")).await.command().is_none());
        assert!(dispatcher.handle(dm(".c")).await.command().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_kind_gating() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("edits")
                    .kinds(EventKind::MESSAGES)
                    .with_command(
                        Command::new("edit")
                            .trigger(".x")
                            .kinds(EventKind::UPDATE)
                            .handler(counting(&hits)),
                    )
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let created = message(&responder, guild("c"), ".x");
        let updated = Event::new(EventKind::UPDATE, guild("c"), ".x", responder.clone().boxed());
        let interaction = Event::new(EventKind::INTERACTION, guild("c"), ".x", responder.boxed());

        assert!(dispatcher.handle(created).await.command().is_none());
        assert!(dispatcher.handle(interaction).await.is_ignored());
        assert!(dispatcher.handle(updated).await.command().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_isolation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(DispatcherConfig::default().apology_message("oops"));
        dispatcher
            .register_module(
                Module::new("m")
                    .with_command(Command::new("boom").trigger(".boom").handler(|ctx: Context| async move {
                        if ctx.handler_name() == "boom" {
                            panic!("handler exploded");
                        }
                        Ok::<_, BoxError>(())
                    }))
                    .unwrap()
                    .with_command(Command::new("ok").trigger(".ok").handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.bus().subscribe(move |p: Arc<CommandPanicked>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(p.command.clone());
            }
        });

        let responder = RecordingResponder::new();
        let report = dispatcher.handle(message(&responder, guild("c"), ".boom")).await;
        assert_eq!(
            report.command().unwrap().status,
            CommandStatus::Executed(HandlerOutcome::Panicked("handler exploded".into()))
        );
        assert_eq!(rx.recv().await.as_deref(), Some("boom"));
        assert_eq!(responder.reply_texts(), vec!["oops"]);

        dispatcher.handle(message(&responder, guild("c"), ".ok")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_passives_run_on_every_accepted_event() {
        let passive_hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("filter")
                    .with_passive(Passive::new("scan").handler(counting(&passive_hits)))
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let report = dispatcher.handle(message(&responder, guild("c"), "hello")).await;
        assert_eq!(report.passives.len(), 1);
        dispatcher.handle(message(&responder, guild("c"), "")).await;
        assert_eq!(passive_hits.load(Ordering::SeqCst), 2);

        dispatcher.set_passive_enabled("filter", "scan", false).unwrap();
        let report = dispatcher.handle(message(&responder, guild("c"), "hello")).await;
        assert!(report.passives.is_empty());
        assert!(matches!(
            dispatcher.set_passive_enabled("filter", "nope", true),
            Err(RegistryError::PassiveNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_permission_and_owner_rejections_are_silent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(DispatcherConfig::default().owner("boss"));
        dispatcher
            .register_module(
                Module::new("admin")
                    .with_command(Command::new("ban").trigger(".ban").permissions(Permissions::BAN_MEMBERS).handler(counting(&hits)))
                    .unwrap()
                    .with_command(Command::new("shutdown").trigger(".shutdown").owner_only(true).handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let report = dispatcher.handle(message(&responder, guild("c"), ".ban x")).await;
        assert!(matches!(
            report.command().unwrap().status,
            CommandStatus::Rejected(Rejection::MissingPermissions(_))
        ));
        let report = dispatcher.handle(message(&responder, guild("c"), ".shutdown")).await;
        assert_eq!(
            report.command().unwrap().status,
            CommandStatus::Rejected(Rejection::OwnerOnly)
        );
        assert!(responder.replies().is_empty());

        responder.set_author_permissions("u1", Permissions::ADMINISTRATOR);
        dispatcher.handle(message(&responder, guild("c"), ".ban x")).await;
        dispatcher
            .handle(message(&responder, Origin::guild("c", "g1", "boss"), ".shutdown"))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_command_is_skipped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("m")
                    .with_command(Command::new("ping").trigger(".ping").handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        dispatcher.set_command_enabled("m", "ping", false).unwrap();
        let responder = RecordingResponder::new();
        assert!(dispatcher.handle(message(&responder, guild("c"), ".ping")).await.command().is_none());

        dispatcher.set_command_enabled("m", "ping", true).unwrap();
        assert!(dispatcher.handle(message(&responder, guild("c"), ".ping")).await.command().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(
            dispatcher.set_command_enabled("m", "pong", true),
            Err(RegistryError::CommandNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_args_follow_trigger() {
        let dispatcher = Dispatcher::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher
            .register_module(
                Module::new("settings")
                    .with_command(Command::new("test").trigger("m?settings test").handler(move |ctx: Context| {
                        let tx = tx.clone();
                        async move {
                            let _ = tx.send(ctx.args().to_vec());
                            Ok::<_, BoxError>(())
                        }
                    }))
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        dispatcher.handle(message(&responder, guild("c"), "m?settings test abc def")).await;
        assert_eq!(rx.recv().await, Some(vec!["abc".to_string(), "def".to_string()]));

        let report = dispatcher.handle(message(&responder, guild("c"), "m?settings")).await;
        assert!(report.command().is_none());
    }

    #[tokio::test]
    async fn test_callback_receives_next_message() {
        let dispatcher = Dispatcher::default();
        dispatcher.register_module(Module::new("m")).unwrap();

        let mut callback = dispatcher
            .callbacks()
            .make(CallbackManager::key("c", "u1"))
            .unwrap();

        let responder = RecordingResponder::new();
        let report = dispatcher.handle(message(&responder, guild("c"), "yes")).await;
        assert!(report.callback_delivered);

        let got = callback.next(Duration::from_secs(1)).await.unwrap();
        assert_eq!(got.content(), "yes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_callback_sees_dispatch_order() {
        let dispatcher = Dispatcher::default();
        dispatcher.register_module(Module::new("m")).unwrap();

        let mut callback = dispatcher
            .callbacks()
            .make(CallbackManager::key("c", "u1"))
            .unwrap();

        let responder = RecordingResponder::new();
        let tasks: Vec<_> = (0..20)
            .map(|n| dispatcher.dispatch(message(&responder, guild("c"), &format!("answer {n}"))))
            .collect();

        for n in 0..20 {
            let got = callback.next(Duration::from_secs(5)).await.unwrap();
            assert_eq!(got.content(), format!("answer {n}"));
        }
        for task in tasks {
            assert!(task.await.unwrap().callback_delivered);
        }
    }

    #[tokio::test]
    async fn test_slash_command_routing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("m")
                    .kinds(EventKind::ALL)
                    .with_slash_command(SlashCommand::new("weather").handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        let responder = RecordingResponder::new();
        let invoke = Event::new(EventKind::INTERACTION, guild("c"), "", responder.boxed())
            .with_interaction("weather");
        let report = dispatcher.handle(invoke).await;
        assert_eq!(report.command().unwrap().command, "weather");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listen_stops_on_cancel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(
                Module::new("m")
                    .with_command(Command::new("ping").trigger(".ping").handler(counting(&hits)))
                    .unwrap(),
            )
            .unwrap();

        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let listener = tokio::spawn(dispatcher.clone().listen(rx, token.clone()));

        let responder = RecordingResponder::new();
        tx.send(message(&responder, guild("c"), ".ping")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while hits.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(!dispatcher.shutdown_token().is_cancelled());
        token.cancel();
        listener.await.unwrap();
        assert!(dispatcher.shutdown_token().is_cancelled());
        assert!(tx.send(message(&responder, guild("c"), ".ping")).await.is_err());
    }

    #[tokio::test]
    async fn test_tower_service() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register_module(Module::new("m").with_command(Command::new("p").trigger(".p")).unwrap())
            .unwrap();

        let responder = RecordingResponder::new();
        let report = dispatcher
            .oneshot(message(&responder, guild("c"), ".p"))
            .await
            .unwrap();
        assert_eq!(report.modules, vec!["m".to_string()]);
        assert!(report.command().is_some());
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_remaining(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_remaining(Duration::from_millis(30)), "0.1s");
        assert_eq!(format_remaining(Duration::ZERO), "0.1s");
        assert_eq!(format_remaining(Duration::from_millis(4210)), "4.3s");
    }
}
