//! Modules: named bundles of commands, passives and slash commands.
//!
//! Registration order is significant. When two commands have overlapping
//! triggers, the one registered first wins; within a command, the first
//! matching trigger wins.
//!
//! ```rust,ignore
//! let mut moderation = Module::new("moderation").allow_dms(false);
//! moderation.register_command(Command::new("ban").trigger(".ban").handler(ban))?;
//! moderation.register_passive(Passive::new("filter").handler(filter_words))?;
//!
//! dispatcher.register_module(moderation)?;
//! ```

use std::sync::Arc;

use tracing::debug;

use bronze_core::{Event, EventKind};

use crate::command::{Command, Trigger};
use crate::error::{RegistryError, RegistryResult};
use crate::passive::Passive;
use crate::policy::{self, Gated};
use crate::slash::SlashCommand;

/// A named, independently registered unit of handlers.
///
/// Defaults: accepts `CREATE` events and allows direct messages, leaving DM
/// gating to the individual commands.
pub struct Module {
    name: String,
    description: String,
    allowed_kinds: EventKind,
    allow_dms: bool,
    commands: Vec<Arc<Command>>,
    passives: Vec<Arc<Passive>>,
    slash_commands: Vec<Arc<SlashCommand>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            allowed_kinds: EventKind::CREATE,
            allow_dms: true,
            commands: Vec::new(),
            passives: Vec::new(),
            slash_commands: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Event kinds the module accepts.
    pub fn kinds(mut self, kinds: EventKind) -> Self {
        self.allowed_kinds = kinds;
        self
    }

    pub fn allow_dms(mut self, allow: bool) -> Self {
        self.allow_dms = allow;
        self
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Adds a command. Fails on a duplicate name, an empty name or a command
    /// without triggers; the module is left unchanged on failure.
    pub fn register_command(&mut self, command: Command) -> RegistryResult<()> {
        command.validate()?;
        if self.command(command.name()).is_some() {
            return Err(RegistryError::DuplicateCommand {
                module: self.name.clone(),
                name: command.name().to_string(),
            });
        }
        debug!(module = %self.name, command = %command.name(), "Command registered");
        self.commands.push(Arc::new(command));
        Ok(())
    }

    /// Adds a passive. Fails on a duplicate or empty name.
    pub fn register_passive(&mut self, passive: Passive) -> RegistryResult<()> {
        passive.validate()?;
        if self.passive(passive.name()).is_some() {
            return Err(RegistryError::DuplicatePassive {
                module: self.name.clone(),
                name: passive.name().to_string(),
            });
        }
        debug!(module = %self.name, passive = %passive.name(), "Passive registered");
        self.passives.push(Arc::new(passive));
        Ok(())
    }

    /// Adds a slash command. Fails on a duplicate or empty name.
    pub fn register_slash_command(&mut self, slash: SlashCommand) -> RegistryResult<()> {
        slash.validate()?;
        if self.slash_command(slash.name()).is_some() {
            return Err(RegistryError::DuplicateSlashCommand {
                module: self.name.clone(),
                name: slash.name().to_string(),
            });
        }
        debug!(module = %self.name, slash = %slash.name(), "Slash command registered");
        self.slash_commands.push(Arc::new(slash));
        Ok(())
    }

    /// Builder form of [`register_command`](Self::register_command).
    pub fn with_command(mut self, command: Command) -> RegistryResult<Self> {
        self.register_command(command)?;
        Ok(self)
    }

    /// Builder form of [`register_passive`](Self::register_passive).
    pub fn with_passive(mut self, passive: Passive) -> RegistryResult<Self> {
        self.register_passive(passive)?;
        Ok(self)
    }

    /// Builder form of [`register_slash_command`](Self::register_slash_command).
    pub fn with_slash_command(mut self, slash: SlashCommand) -> RegistryResult<Self> {
        self.register_slash_command(slash)?;
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    /// Commands in registration order.
    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    /// Passives in registration order.
    pub fn passives(&self) -> &[Arc<Passive>] {
        &self.passives
    }

    pub fn slash_commands(&self) -> &[Arc<SlashCommand>] {
        &self.slash_commands
    }

    pub fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    pub fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    pub fn command(&self, name: &str) -> Option<&Arc<Command>> {
        self.commands.iter().find(|c| c.name() == name)
    }

    pub fn passive(&self, name: &str) -> Option<&Arc<Passive>> {
        self.passives.iter().find(|p| p.name() == name)
    }

    /// Looks up a slash command by name, ignoring ASCII case the same way
    /// interaction matching does.
    pub fn slash_command(&self, name: &str) -> Option<&Arc<SlashCommand>> {
        self.slash_commands
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Returns `true` if the event's kind intersects the module's mask and
    /// the module allows the event's DM status.
    pub fn accepts(&self, event: &Event) -> bool {
        policy::filter(self, event).is_ok()
    }

    /// Passives eligible for `event`, in registration order.
    pub fn passives_for<'a>(&'a self, event: &'a Event) -> impl Iterator<Item = &'a Arc<Passive>> {
        self.passives
            .iter()
            .filter(move |p| policy::filter(p.as_ref(), event).is_ok())
    }

    /// Finds the first eligible command with a trigger matching `tokens`,
    /// together with the trigger that matched.
    pub fn find_command<'a>(
        &'a self,
        event: &Event,
        tokens: &[&str],
    ) -> Option<(&'a Arc<Command>, &'a Trigger)> {
        self.commands.iter().find_map(|command| {
            if policy::filter(command.as_ref(), event).is_err() {
                return None;
            }
            command.match_tokens(tokens).map(|trigger| (command, trigger))
        })
    }

    /// Finds the eligible slash command invoked by `event`.
    pub fn find_slash_command(&self, event: &Event) -> Option<&Arc<SlashCommand>> {
        self.slash_commands
            .iter()
            .find(|s| s.matches(event) && policy::filter(s.as_ref(), event).is_ok())
    }
}

impl Gated for Module {
    fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    fn allows_dms(&self) -> bool {
        self.allow_dms
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("allowed_kinds", &self.allowed_kinds)
            .field("allow_dms", &self.allow_dms)
            .field("commands", &self.commands.len())
            .field("passives", &self.passives.len())
            .field("slash_commands", &self.slash_commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::Origin;
    use bronze_core::testing::RecordingResponder;

    fn event(kind: EventKind, origin: Origin, text: &str) -> Event {
        Event::new(kind, origin, text, RecordingResponder::shared())
    }

    #[test]
    fn test_slash_duplicate_ignores_case() {
        let mut module = Module::new("info");
        module
            .register_slash_command(SlashCommand::new("weather"))
            .unwrap();

        let err = module
            .register_slash_command(SlashCommand::new("Weather"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateSlashCommand {
                module: "info".into(),
                name: "Weather".into()
            }
        );
        assert_eq!(module.slash_commands().len(), 1);
        assert_eq!(module.slash_command("WEATHER").unwrap().name(), "weather");
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let mut module = Module::new("fun");
        module
            .register_command(Command::new("roll").trigger(".roll"))
            .unwrap();

        let err = module
            .register_command(Command::new("roll").trigger(".dice"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateCommand {
                module: "fun".into(),
                name: "roll".into()
            }
        );
        assert_eq!(module.commands().len(), 1);
        assert_eq!(
            module.command("roll").unwrap().get_triggers()[0].phrase(),
            ".roll"
        );
    }

    #[test]
    fn test_duplicate_passive_rejected() {
        let mut module = Module::new("mod");
        module.register_passive(Passive::new("filter")).unwrap();
        assert!(matches!(
            module.register_passive(Passive::new("filter")),
            Err(RegistryError::DuplicatePassive { .. })
        ));
        assert_eq!(module.passives().len(), 1);
    }

    #[test]
    fn test_malformed_commands_rejected() {
        let mut module = Module::new("m");
        assert!(matches!(
            module.register_command(Command::new("x")),
            Err(RegistryError::NoTriggers { .. })
        ));
        assert!(matches!(
            module.register_passive(Passive::new(" ")),
            Err(RegistryError::EmptyName { what: "passive" })
        ));
        assert!(module.commands().is_empty());
    }

    #[test]
    fn test_first_registered_command_wins() {
        let module = Module::new("m")
            .with_command(Command::new("first").trigger(".a"))
            .unwrap()
            .with_command(Command::new("second").trigger(".a b"))
            .unwrap();

        let e = event(EventKind::CREATE, Origin::guild("c", "g", "u"), ".a b");
        let tokens = e.tokens();
        let (command, _) = module.find_command(&e, &tokens).unwrap();
        assert_eq!(command.name(), "first");
    }

    #[test]
    fn test_find_command_skips_ineligible() {
        let module = Module::new("m")
            .with_command(Command::new("guild-only").trigger(".a"))
            .unwrap()
            .with_command(Command::new("dm-ok").trigger(".a").allow_dms(true))
            .unwrap();

        let dm = event(EventKind::CREATE, Origin::direct("c", "u"), ".a");
        let tokens = dm.tokens();
        let (command, trigger) = module.find_command(&dm, &tokens).unwrap();
        assert_eq!(command.name(), "dm-ok");
        assert_eq!(trigger.len(), 1);

        module.command("dm-ok").unwrap().set_enabled(false);
        assert!(module.find_command(&dm, &tokens).is_none());
    }

    #[test]
    fn test_module_accepts() {
        let module = Module::new("m").kinds(EventKind::MESSAGES).allow_dms(false);
        assert!(module.accepts(&event(EventKind::UPDATE, Origin::guild("c", "g", "u"), "")));
        assert!(!module.accepts(&event(EventKind::INTERACTION, Origin::guild("c", "g", "u"), "")));
        assert!(!module.accepts(&event(EventKind::CREATE, Origin::direct("c", "u"), "")));
    }
}
