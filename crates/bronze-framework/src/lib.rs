//! # Bronze Framework
//!
//! The command-dispatch core built on the `bronze-core` data model.
//!
//! This layer provides:
//! - Module registry with duplicate detection and ordered trigger matching
//! - Policy checks: event kinds, direct messages, owners, permissions
//! - Per-key cooldowns with timer-based expiry
//! - Callbacks for multi-turn conversations
//! - A typed event bus carrying lifecycle notifications
//! - The [`Dispatcher`], which runs handlers concurrently and isolates panics
//!
//! ```rust,ignore
//! use bronze_framework::prelude::*;
//!
//! let mut fun = Module::new("fun");
//! fun.register_command(
//!     Command::new("ping")
//!         .trigger(".ping")
//!         .cooldown(Duration::from_secs(3), CooldownScope::User)
//!         .handler(|ctx: Context| async move {
//!             ctx.reply("pong").await?;
//!             Ok(())
//!         }),
//! )?;
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::default());
//! dispatcher.register_module(fun)?;
//! ```

pub mod bus;
pub mod callback;
pub mod command;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod module;
pub mod passive;
pub mod policy;
pub mod runner;
pub mod slash;

pub use bus::{EventBus, SubscriptionId};
pub use callback::{Callback, CallbackManager, CallbackSender};
pub use command::{Command, Trigger};
pub use cooldown::{CooldownManager, CooldownScope};
pub use dispatcher::{
    CommandReport, CommandStatus, DispatchReport, Dispatcher, DispatcherConfig, format_remaining,
};
pub use error::{CallbackError, CallbackResult, RegistryError, RegistryResult};
pub use handler::{BoxError, Context, HandlerFn, HandlerResult, IntoHandler};
pub use lifecycle::{
    CommandErrored, CommandPanicked, CommandRan, PassiveErrored, PassivePanicked, PassiveRan,
};
pub use module::Module;
pub use passive::Passive;
pub use policy::{Gated, Rejection};
pub use runner::HandlerOutcome;
pub use slash::SlashCommand;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BoxError, Callback, CallbackManager, Command, Context, CooldownManager, CooldownScope,
        Dispatcher, DispatcherConfig, EventBus, HandlerResult, Module, Passive, SlashCommand,
    };
    pub use bronze_core::prelude::*;
}
