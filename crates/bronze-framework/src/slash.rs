//! Platform-native slash commands.
//!
//! A [`SlashCommand`] is selected only for `INTERACTION` events whose
//! interaction name equals the command name (ignoring case). It goes through
//! the same owner, permission and cooldown checks as a text [`Command`](crate::Command),
//! but has no triggers and receives no argument tokens; options are read
//! from the event payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bronze_core::{Event, EventKind, Permissions};

use crate::cooldown::CooldownScope;
use crate::error::{RegistryError, RegistryResult};
use crate::handler::{HandlerFn, IntoHandler, noop_handler};
use crate::policy::Gated;

pub struct SlashCommand {
    name: String,
    description: String,
    permissions: Permissions,
    owner_only: bool,
    cooldown: Duration,
    cooldown_scope: CooldownScope,
    allow_dms: bool,
    enabled: AtomicBool,
    handler: HandlerFn,
}

impl SlashCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            permissions: Permissions::empty(),
            owner_only: false,
            cooldown: Duration::ZERO,
            cooldown_scope: CooldownScope::None,
            allow_dms: false,
            enabled: AtomicBool::new(true),
            handler: noop_handler(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn owner_only(mut self, owner_only: bool) -> Self {
        self.owner_only = owner_only;
        self
    }

    pub fn cooldown(mut self, duration: Duration, scope: CooldownScope) -> Self {
        self.cooldown = duration;
        self.cooldown_scope = scope;
        self
    }

    pub fn allow_dms(mut self, allow: bool) -> Self {
        self.allow_dms = allow;
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

    pub fn get_cooldown(&self) -> (Duration, CooldownScope) {
        (self.cooldown, self.cooldown_scope)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns `true` if `event` invokes this command.
    pub fn matches(&self, event: &Event) -> bool {
        event.kind().accepted_by(EventKind::INTERACTION)
            && event
                .interaction()
                .is_some_and(|name| name.eq_ignore_ascii_case(&self.name))
    }

    pub(crate) fn handler_fn(&self) -> &HandlerFn {
        &self.handler
    }

    pub(crate) fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName {
                what: "slash command",
            });
        }
        Ok(())
    }
}

impl Gated for SlashCommand {
    fn allowed_kinds(&self) -> EventKind {
        EventKind::INTERACTION
    }

    fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    fn is_enabled(&self) -> bool {
        SlashCommand::is_enabled(self)
    }

    fn owner_only(&self) -> bool {
        self.owner_only
    }

    fn required_permissions(&self) -> Permissions {
        self.permissions
    }
}

impl std::fmt::Debug for SlashCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlashCommand")
            .field("name", &self.name)
            .field("permissions", &self.permissions)
            .field("owner_only", &self.owner_only)
            .field("allow_dms", &self.allow_dms)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::Origin;
    use bronze_core::testing::RecordingResponder;

    #[test]
    fn test_matches_interaction_name_only() {
        let slash = SlashCommand::new("weather");
        let responder = RecordingResponder::shared();

        let invoked = Event::new(
            EventKind::INTERACTION,
            Origin::guild("c", "g", "u"),
            "",
            responder.clone(),
        )
        .with_interaction("Weather");
        let other = invoked.clone().with_interaction("ban");
        let message = Event::new(
            EventKind::CREATE,
            Origin::guild("c", "g", "u"),
            "weather",
            responder,
        );

        assert!(slash.matches(&invoked));
        assert!(!slash.matches(&other));
        assert!(!slash.matches(&message));
    }
}
