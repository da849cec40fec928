//! Runtime error types.

use bronze_framework::RegistryError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Module registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// `run` or `run_until` was called a second time.
    #[error("Runtime is already running")]
    AlreadyRunning,

    /// The runtime stopped listening; the event was not accepted.
    #[error("Runtime is no longer accepting events")]
    Closed,

    /// The inbound buffer is full.
    #[error("Inbound event buffer is full")]
    Backpressure,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
