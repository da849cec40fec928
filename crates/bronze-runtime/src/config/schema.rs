//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! owners = ["123456789"]
//! event_buffer = 256
//! max_concurrent_handlers = 64
//! cooldown_message = "Slow down! Try again in {remaining}."
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [logging.filters]
//! bronze_framework = "trace"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use bronze_framework::DispatcherConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BronzeConfig {
    /// Dispatcher and inbound channel settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    /// User ids allowed to run owner-only commands.
    #[serde(default)]
    pub owners: Vec<String>,

    /// Capacity of the inbound event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Upper bound on concurrently running handlers; 0 is unbounded.
    #[serde(default)]
    pub max_concurrent_handlers: usize,

    /// Also require the bot to hold a command's permissions.
    #[serde(default = "default_true")]
    pub check_bot_permissions: bool,

    /// Reply sent when a command panics.
    #[serde(default = "default_apology_message")]
    pub apology_message: String,

    /// Reply sent when a command is on cooldown. `{remaining}` is replaced
    /// with the remaining time.
    #[serde(default = "default_cooldown_message")]
    pub cooldown_message: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            event_buffer: default_event_buffer(),
            max_concurrent_handlers: 0,
            check_bot_permissions: true,
            apology_message: default_apology_message(),
            cooldown_message: default_cooldown_message(),
        }
    }
}

impl BotConfig {
    /// Converts to the dispatcher's own settings.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            owners: self.owners.clone(),
            check_bot_permissions: self.check_bot_permissions,
            max_concurrent_handlers: self.max_concurrent_handlers,
            apology_message: self.apology_message.clone(),
            cooldown_message: self.cooldown_message.clone(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_apology_message() -> String {
    DispatcherConfig::default().apology_message
}

fn default_cooldown_message() -> String {
    DispatcherConfig::default().cooldown_message
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// File rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target level overrides, e.g. `bronze_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_defaults_match_dispatcher() {
        let bot = BotConfig::default();
        assert_eq!(bot.event_buffer, 256);
        assert_eq!(bot.to_dispatcher_config(), DispatcherConfig::default());
    }

    #[test]
    fn test_log_level_conversions() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }
}
