//! Explicitly triggered, policy-gated commands.
//!
//! A [`Command`] is matched against the leading tokens of an event's text.
//! Triggers are compared token by token and case-insensitively, so the
//! trigger `"m?settings test"` matches `"M?Settings  test abc"` (with `abc`
//! left as the argument) but not `"m?settings"` alone.
//!
//! ```rust,ignore
//! let command = Command::new("ban")
//!     .description("Ban a member")
//!     .trigger(".ban")
//!     .trigger("m?ban")
//!     .permissions(Permissions::BAN_MEMBERS)
//!     .cooldown(Duration::from_secs(5), CooldownScope::Channel)
//!     .handler(ban);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bronze_core::{EventKind, Permissions};

use crate::cooldown::CooldownScope;
use crate::error::{RegistryError, RegistryResult};
use crate::handler::{HandlerFn, IntoHandler, noop_handler};
use crate::policy::Gated;

// ============================================================================
// Trigger
// ============================================================================

/// A trigger phrase, pre-split into lowercase tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    phrase: String,
    tokens: Vec<String>,
}

impl Trigger {
    pub fn new(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into();
        let tokens = phrase.split_whitespace().map(str::to_lowercase).collect();
        Self { phrase, tokens }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Number of tokens in the trigger.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns `true` if `tokens` starts with this trigger's tokens,
    /// ignoring case. An empty trigger matches nothing.
    pub fn matches(&self, tokens: &[&str]) -> bool {
        !self.tokens.is_empty()
            && tokens.len() >= self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(tokens)
                .all(|(want, got)| got.to_lowercase() == *want)
    }
}

// ============================================================================
// Command
// ============================================================================

/// An explicitly triggered leaf handler.
///
/// Defaults: accepts `CREATE` events, rejects direct messages, no required
/// permissions, not owner-only, no cooldown, enabled.
pub struct Command {
    name: String,
    description: String,
    triggers: Vec<Trigger>,
    permissions: Permissions,
    owner_only: bool,
    cooldown: Duration,
    cooldown_scope: CooldownScope,
    allow_dms: bool,
    allowed_kinds: EventKind,
    enabled: AtomicBool,
    handler: HandlerFn,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            triggers: Vec::new(),
            permissions: Permissions::empty(),
            owner_only: false,
            cooldown: Duration::ZERO,
            cooldown_scope: CooldownScope::None,
            allow_dms: false,
            allowed_kinds: EventKind::CREATE,
            enabled: AtomicBool::new(true),
            handler: noop_handler(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a trigger phrase. Triggers are tried in the order added.
    pub fn trigger(mut self, phrase: impl Into<String>) -> Self {
        self.triggers.push(Trigger::new(phrase));
        self
    }

    /// Appends several trigger phrases.
    pub fn triggers<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(phrases.into_iter().map(Trigger::new));
        self
    }

    /// Permissions the author (and, if enabled, the bot) must hold.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn owner_only(mut self, owner_only: bool) -> Self {
        self.owner_only = owner_only;
        self
    }

    /// Rate limits the command. A zero duration or `CooldownScope::None`
    /// disables the cooldown.
    pub fn cooldown(mut self, duration: Duration, scope: CooldownScope) -> Self {
        self.cooldown = duration;
        self.cooldown_scope = scope;
        self
    }

    pub fn allow_dms(mut self, allow: bool) -> Self {
        self.allow_dms = allow;
        self
    }

    /// Event kinds the command accepts.
    pub fn kinds(mut self, kinds: EventKind) -> Self {
        self.allowed_kinds = kinds;
        self
    }

    pub fn enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::Relaxed);
        self
    }

    pub fn handler<H: IntoHandler>(mut self, handler: H) -> Self {
        self.handler = handler.into_handler();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn get_triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn get_permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn is_owner_only(&self) -> bool {
        self.owner_only
    }

    pub fn get_cooldown(&self) -> (Duration, CooldownScope) {
        (self.cooldown, self.cooldown_scope)
    }

    pub fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    pub fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables the command at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn handler_fn(&self) -> &HandlerFn {
        &self.handler
    }

    /// Returns the first trigger that matches `tokens`.
    pub fn match_tokens(&self, tokens: &[&str]) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.matches(tokens))
    }

    /// Rejects unnamed commands and commands without a usable trigger.
    pub(crate) fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName { what: "command" });
        }
        if self.triggers.iter().all(Trigger::is_empty) {
            return Err(RegistryError::NoTriggers {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Gated for Command {
    fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    fn is_enabled(&self) -> bool {
        Command::is_enabled(self)
    }

    fn owner_only(&self) -> bool {
        self.owner_only
    }

    fn required_permissions(&self) -> Permissions {
        self.permissions
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .field("permissions", &self.permissions)
            .field("owner_only", &self.owner_only)
            .field("cooldown", &self.cooldown)
            .field("cooldown_scope", &self.cooldown_scope)
            .field("allow_dms", &self.allow_dms)
            .field("allowed_kinds", &self.allowed_kinds)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_multi_token_trigger() {
        let trigger = Trigger::new("m?settings test");
        assert!(trigger.matches(&tokens("m?settings test abc")));
        assert!(trigger.matches(&tokens("M?SETTINGS Test")));
        assert!(!trigger.matches(&tokens("m?settings")));
        assert!(!trigger.matches(&tokens("test")));
        assert!(!trigger.matches(&tokens("m?settingstest")));
    }

    #[test]
    fn test_shorter_trigger_on_same_command() {
        let command = Command::new("settings")
            .trigger("m?settings test")
            .trigger("test");

        assert_eq!(
            command.match_tokens(&tokens("test")).map(Trigger::phrase),
            Some("test")
        );
        assert_eq!(
            command
                .match_tokens(&tokens("m?settings test abc"))
                .map(Trigger::phrase),
            Some("m?settings test")
        );
        assert!(command.match_tokens(&tokens("m?settings")).is_none());
    }

    #[test]
    fn test_empty_trigger_never_matches() {
        assert!(!Trigger::new("   ").matches(&tokens("anything")));
        assert!(!Trigger::new("").matches(&[]));
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            Command::new("").trigger(".x").validate(),
            Err(RegistryError::EmptyName { what: "command" })
        );
        assert_eq!(
            Command::new("x").trigger("  ").validate(),
            Err(RegistryError::NoTriggers { name: "x".into() })
        );
        assert!(Command::new("x").trigger(".x").validate().is_ok());
    }

    #[test]
    fn test_defaults_and_runtime_toggle() {
        let command = Command::new("ping").trigger(".ping");
        assert!(command.is_enabled());
        assert!(!command.allows_dms());
        assert_eq!(command.allowed_kinds(), EventKind::CREATE);
        assert_eq!(command.get_cooldown(), (Duration::ZERO, CooldownScope::None));

        command.set_enabled(false);
        assert!(!command.is_enabled());
    }
}
