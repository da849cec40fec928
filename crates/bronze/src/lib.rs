//! # Bronze
//!
//! A command-dispatch core for chat bots.
//!
//! ## Overview
//!
//! A gateway client turns platform traffic into [`Event`](core::Event)s and
//! hands them to the runtime. The dispatcher routes each event to every
//! module that accepts it, runs the module's passives, and runs at most one
//! command per module. Every handler runs in its own task behind a panic
//! guard.
//!
//! ```text
//! ┌──────────┐ EventSender ┌─────────┐   ┌────────────┐   ┌────────────────────────────┐
//! │ Gateway  │────────────▶│ Runtime │──▶│ Dispatcher │──▶│ Module "fun"   passives +  │
//! │ client   │             │         │   │            │──▶│ Module "admin" one command │
//! └──────────┘             └─────────┘   └────────────┘   └────────────────────────────┘
//!                                             │ lifecycle events
//!                                             ▼
//!                                         EventBus ──▶ LifecycleLogger
//! ```
//!
//! - **Modules**: named units of commands, passives and slash commands
//! - **Commands**: trigger-matched handlers with permission, owner,
//!   DM and cooldown policies
//! - **Passives**: handlers that see every accepted event
//! - **Callbacks**: multi-turn conversations keyed by channel and author
//! - **Event bus**: typed publish/subscribe for lifecycle notifications
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bronze::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BronzeRuntime::builder().build()?;
//!
//!     let mut fun = Module::new("fun");
//!     fun.register_command(
//!         Command::new("ping")
//!             .trigger(".ping")
//!             .cooldown(Duration::from_secs(3), CooldownScope::User)
//!             .handler(|ctx: Context| async move {
//!                 ctx.reply("pong").await?;
//!                 Ok(())
//!             }),
//!     )?;
//!     runtime.dispatcher().register_module(fun)?;
//!
//!     tokio::spawn(gateway(runtime.sender()));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use bronze_core as core;
pub use bronze_framework as framework;
pub use bronze_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use bronze::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use bronze_runtime::{BronzeConfig, BronzeRuntime, EventSender, RuntimeError};

    // Registry and dispatch
    pub use bronze_framework::prelude::*;
    pub use bronze_framework::{CommandStatus, DispatchReport, HandlerOutcome, RegistryError};

    // Lifecycle notifications
    pub use bronze_framework::{
        CommandErrored, CommandPanicked, CommandRan, PassiveErrored, PassivePanicked, PassiveRan,
    };

    pub use std::sync::Arc;
    pub use std::time::Duration;

    // Logging macros
    pub use bronze_runtime::prelude::*;
}
