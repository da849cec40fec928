//! Error types for the Bronze framework.

use thiserror::Error;

/// Errors raised by module registration and registry lookups.
///
/// The `Duplicate*`, `EmptyName` and `NoTriggers` variants are configuration
/// errors: they are returned at registration time and callers should treat
/// them as fatal start-up failures. The `*NotFound` variants are ordinary
/// lookup results that callers branch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A module with this name is already registered on the dispatcher.
    #[error("module '{name}' is already registered")]
    DuplicateModule {
        /// The duplicate module name.
        name: String,
    },

    /// A command with this name already exists in the module.
    #[error("module '{module}' already has a command named '{name}'")]
    DuplicateCommand {
        /// The module that rejected the command.
        module: String,
        /// The duplicate command name.
        name: String,
    },

    /// A passive with this name already exists in the module.
    #[error("module '{module}' already has a passive named '{name}'")]
    DuplicatePassive {
        /// The module that rejected the passive.
        module: String,
        /// The duplicate passive name.
        name: String,
    },

    /// A slash command with this name already exists in the module.
    #[error("module '{module}' already has a slash command named '{name}'")]
    DuplicateSlashCommand {
        /// The module that rejected the slash command.
        module: String,
        /// The duplicate slash command name.
        name: String,
    },

    /// A module, command, passive or slash command was built without a name.
    #[error("{what} name must not be empty")]
    EmptyName {
        /// What kind of item was unnamed.
        what: &'static str,
    },

    /// A command was built without any trigger phrase.
    #[error("command '{name}' has no trigger phrases")]
    NoTriggers {
        /// The command name.
        name: String,
    },

    /// No module with this name is registered.
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    /// The module has no command with this name.
    #[error("command '{command}' not found in module '{module}'")]
    CommandNotFound {
        /// The module that was searched.
        module: String,
        /// The missing command name.
        command: String,
    },

    /// The module has no passive with this name.
    #[error("passive '{passive}' not found in module '{module}'")]
    PassiveNotFound {
        /// The module that was searched.
        module: String,
        /// The missing passive name.
        passive: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the [`CallbackManager`](crate::callback::CallbackManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// No callback is registered under the key.
    #[error("no callback registered for '{0}'")]
    NotFound(String),

    /// A callback is already registered under the key.
    #[error("a callback is already registered for '{0}'")]
    AlreadyExists(String),
}

/// Result type for callback operations.
pub type CallbackResult<T> = Result<T, CallbackError>;
