//! Event loop orchestration.
//!
//! [`BronzeRuntime`] owns the inbound event channel and the [`Dispatcher`].
//! A gateway client pushes events through an [`EventSender`]; the runtime
//! feeds them to the dispatcher until a shutdown signal arrives.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use bronze_runtime::BronzeRuntime;
//!
//! let runtime = BronzeRuntime::builder()
//!     .config_file("bronze.toml")
//!     .build()?;
//!
//! runtime.dispatcher().register_module(fun_module())?;
//! tokio::spawn(gateway(runtime.sender()));
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;

use bronze_core::Event;
use bronze_framework::Dispatcher;
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BronzeConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::observer::LifecycleLogger;

// =============================================================================
// EventSender
// =============================================================================

/// Cloneable handle a gateway client uses to submit events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Submits an event, waiting while the inbound buffer is full.
    pub async fn send(&self, event: Event) -> RuntimeResult<()> {
        self.tx.send(event).await.map_err(|_| RuntimeError::Closed)
    }

    /// Submits an event without waiting. A full buffer is reported as
    /// [`RuntimeError::Backpressure`].
    pub fn try_send(&self, event: Event) -> RuntimeResult<()> {
        self.tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RuntimeError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => RuntimeError::Closed,
        })
    }

    /// Returns `true` once the runtime has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// BronzeRuntime
// =============================================================================

/// Owns the dispatcher and its inbound channel.
pub struct BronzeRuntime {
    config: BronzeConfig,
    dispatcher: Dispatcher,
    tx: mpsc::Sender<Event>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    shutdown: CancellationToken,
    lifecycle: LifecycleLogger,
}

impl BronzeRuntime {
    /// Creates a runtime builder that searches the current directory.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging, builds the dispatcher and attaches the
    /// lifecycle logger to its bus.
    pub fn from_config(config: BronzeConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let dispatcher = Dispatcher::new(config.bot.to_dispatcher_config());
        let lifecycle = LifecycleLogger::attach(dispatcher.bus());
        let (tx, rx) = mpsc::channel(config.bot.event_buffer);

        info!(
            log_level = %config.logging.level,
            event_buffer = config.bot.event_buffer,
            max_concurrent_handlers = config.bot.max_concurrent_handlers,
            owners = config.bot.owners.len(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            dispatcher,
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
            lifecycle,
        })
    }

    pub fn config(&self) -> &BronzeConfig {
        &self.config
    }

    /// The dispatcher, for registering modules and runtime toggles.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn lifecycle_logger(&self) -> &LifecycleLogger {
        &self.lifecycle
    }

    /// Returns a new handle for submitting events.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Token that stops the listen loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Listens until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Bronze runtime is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Listens until `shutdown` resolves or the shutdown token is cancelled.
    ///
    /// Can only run once; a second call returns [`RuntimeError::AlreadyRunning`].
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let rx = self.rx.lock().take().ok_or(RuntimeError::AlreadyRunning)?;
        let token = self.shutdown.clone();
        let listener = tokio::spawn(self.dispatcher.clone().listen(rx, token.clone()));

        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            _ = token.cancelled() => info!("Shutdown token cancelled"),
        }
        token.cancel();

        if let Err(err) = listener.await {
            warn!(error = %err, "Listen loop ended abnormally");
        }
        info!("Runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for BronzeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BronzeRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("running", &self.rx.lock().is_none())
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
///
/// If a signal handler cannot be installed the failure is logged and the
/// remaining signal is awaited.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to register SIGTERM handler");
                ctrl_c().await;
                info!("Received Ctrl+C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`BronzeRuntime`] with loaded configuration.
///
/// ```rust,ignore
/// let runtime = BronzeRuntime::builder()
///     .config_file("config/bronze.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration above every file and environment source.
    pub fn merge(mut self, config: BronzeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<BronzeRuntime> {
        let config = self.config_loader.load()?;
        BronzeRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
