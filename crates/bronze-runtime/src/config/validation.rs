//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, BronzeConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BronzeConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates dispatcher settings.
fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.event_buffer == 0 {
        return Err(ConfigError::validation(
            "Event buffer must be greater than 0",
        ));
    }

    let mut seen = HashSet::new();
    for owner in &bot.owners {
        if owner.is_empty() {
            return Err(ConfigError::validation("Owner id cannot be empty"));
        }
        if owner.chars().any(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Owner id cannot contain whitespace: {owner:?}"
            )));
        }
        if !seen.insert(owner) {
            return Err(ConfigError::validation(format!(
                "Duplicate owner id: {owner}"
            )));
        }
    }

    if bot.apology_message.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.apology_message"));
    }
    if bot.cooldown_message.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.cooldown_message"));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target cannot be empty: {target:?}"
        )));
    }

    Ok(())
}
