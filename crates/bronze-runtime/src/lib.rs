//! Bronze Runtime - configuration, logging and the event loop.
//!
//! This crate provides:
//! - Layered configuration (`BronzeConfig`, `ConfigLoader`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - A bus observer that logs every handler outcome (`LifecycleLogger`)
//! - The runtime that owns the inbound channel (`BronzeRuntime`)
//!
//! ```ignore
//! use bronze_runtime::BronzeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BronzeRuntime::builder().build()?;
//!     runtime.dispatcher().register_module(my_module())?;
//!
//!     // Hand a sender to whatever produces events.
//!     tokio::spawn(gateway(runtime.sender()));
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod observer;
pub mod runtime;

pub use config::{
    BotConfig, BronzeConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use observer::LifecycleLogger;
pub use runtime::{BronzeRuntime, EventSender, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude with the common logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
