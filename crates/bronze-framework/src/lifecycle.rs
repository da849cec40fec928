//! Lifecycle notifications published on the [`EventBus`](crate::bus::EventBus).
//!
//! Every handler run ends in exactly one of these: `*Ran` on success,
//! `*Errored` when the handler returned an error and `*Panicked` when it
//! panicked. Slash commands report through the `Command*` types.

use std::sync::Arc;
use std::time::Duration;

use bronze_core::Event;

/// A command handler finished successfully.
#[derive(Debug, Clone)]
pub struct CommandRan {
    pub module: String,
    pub command: String,
    pub event: Arc<Event>,
    pub elapsed: Duration,
}

/// A command handler returned an error.
#[derive(Debug, Clone)]
pub struct CommandErrored {
    pub module: String,
    pub command: String,
    pub event: Arc<Event>,
    pub error: String,
}

/// A command handler panicked.
#[derive(Debug, Clone)]
pub struct CommandPanicked {
    pub module: String,
    pub command: String,
    pub event: Arc<Event>,
    /// The panic message, or a placeholder for non-string payloads.
    pub reason: String,
}

/// A passive handler finished successfully.
#[derive(Debug, Clone)]
pub struct PassiveRan {
    pub module: String,
    pub passive: String,
    pub event: Arc<Event>,
    pub elapsed: Duration,
}

/// A passive handler returned an error.
#[derive(Debug, Clone)]
pub struct PassiveErrored {
    pub module: String,
    pub passive: String,
    pub event: Arc<Event>,
    pub error: String,
}

/// A passive handler panicked.
#[derive(Debug, Clone)]
pub struct PassivePanicked {
    pub module: String,
    pub passive: String,
    pub event: Arc<Event>,
    pub reason: String,
}
