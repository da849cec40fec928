//! Background handlers that run on every accepted event.

use std::sync::atomic::{AtomicBool, Ordering};

use bronze_core::{EventKind, Permissions};

use crate::error::{RegistryError, RegistryResult};
use crate::handler::{HandlerFn, IntoHandler, noop_handler};
use crate::policy::Gated;

/// A handler that runs unconditionally on every event its module and its own
/// filters accept, e.g. a content filter.
///
/// Defaults: accepts `CREATE` events, rejects direct messages, enabled.
pub struct Passive {
    name: String,
    description: String,
    allow_dms: bool,
    allowed_kinds: EventKind,
    enabled: AtomicBool,
    handler: HandlerFn,
}

impl Passive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
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

    pub fn allow_dms(mut self, allow: bool) -> Self {
        self.allow_dms = allow;
        self
    }

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

    pub fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    pub fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn handler_fn(&self) -> &HandlerFn {
        &self.handler
    }

    pub(crate) fn validate(&self) -> RegistryResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName { what: "passive" });
        }
        Ok(())
    }
}

impl Gated for Passive {
    fn allowed_kinds(&self) -> EventKind {
        self.allowed_kinds
    }

    fn allows_dms(&self) -> bool {
        self.allow_dms
    }

    fn is_enabled(&self) -> bool {
        Passive::is_enabled(self)
    }

    fn owner_only(&self) -> bool {
        false
    }

    fn required_permissions(&self) -> Permissions {
        Permissions::empty()
    }
}

impl std::fmt::Debug for Passive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passive")
            .field("name", &self.name)
            .field("allow_dms", &self.allow_dms)
            .field("allowed_kinds", &self.allowed_kinds)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
