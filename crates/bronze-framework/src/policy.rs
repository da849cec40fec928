//! Policy checks applied before a handler runs.
//!
//! Checks happen in two stages. [`filter`] is synchronous and decides whether
//! an item is eligible for an event at all (kind mask, DM flag, enabled).
//! [`authorize`] runs afterwards for commands and may call the responder to
//! resolve permissions.
//!
//! A rejection is not an error: the dispatcher logs it at `debug` and moves
//! on without replying.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use bronze_core::{ApiError, Event, EventKind, Permissions};

/// The policy surface shared by modules, commands, passives and slash
/// commands.
pub trait Gated {
    fn allowed_kinds(&self) -> EventKind;

    fn allows_dms(&self) -> bool;

    fn is_enabled(&self) -> bool {
        true
    }

    fn owner_only(&self) -> bool {
        false
    }

    fn required_permissions(&self) -> Permissions {
        Permissions::empty()
    }
}

/// Why a handler was not run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("event kind {kind:?} not in {allowed:?}")]
    WrongKind { kind: EventKind, allowed: EventKind },

    #[error("direct messages not allowed")]
    DirectMessage,

    #[error("disabled")]
    Disabled,

    #[error("owner only")]
    OwnerOnly,

    #[error("author is missing {0:?}")]
    MissingPermissions(Permissions),

    #[error("bot is missing {0:?}")]
    BotMissingPermissions(Permissions),

    /// The responder could not resolve permissions; treated as a denial.
    #[error("permission lookup failed: {0}")]
    PermissionLookupFailed(String),
}

/// Kind, DM and enabled checks.
pub fn filter<G: Gated + ?Sized>(gated: &G, event: &Event) -> Result<(), Rejection> {
    let allowed = gated.allowed_kinds();
    if !event.kind().accepted_by(allowed) {
        return Err(Rejection::WrongKind {
            kind: event.kind(),
            allowed,
        });
    }
    if event.is_direct() && !gated.allows_dms() {
        return Err(Rejection::DirectMessage);
    }
    if !gated.is_enabled() {
        return Err(Rejection::Disabled);
    }
    Ok(())
}

/// Owner and permission checks.
///
/// With `check_bot` set, the bot's own permissions in the event's channel
/// must also satisfy the requirement.
pub async fn authorize<G: Gated + ?Sized>(
    gated: &G,
    event: &Event,
    owners: &HashSet<String>,
    check_bot: bool,
) -> Result<(), Rejection> {
    if gated.owner_only() && !owners.contains(event.author_id()) {
        return Err(Rejection::OwnerOnly);
    }

    let required = gated.required_permissions();
    if required.is_empty() {
        return Ok(());
    }

    let responder = event.responder();
    let author = responder
        .author_permissions(event.origin())
        .await
        .map_err(lookup_failed)?;
    if !author.satisfies(required) {
        return Err(Rejection::MissingPermissions(author.missing(required)));
    }

    if check_bot {
        let bot = responder
            .bot_permissions(event.channel_id())
            .await
            .map_err(lookup_failed)?;
        if !bot.satisfies(required) {
            return Err(Rejection::BotMissingPermissions(bot.missing(required)));
        }
    }

    Ok(())
}

fn lookup_failed(err: ApiError) -> Rejection {
    debug!(error = %err, "Permission lookup failed");
    Rejection::PermissionLookupFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bronze_core::Origin;
    use bronze_core::testing::RecordingResponder;
    use std::sync::Arc;

    struct Item {
        kinds: EventKind,
        dms: bool,
        enabled: bool,
        owner_only: bool,
        perms: Permissions,
    }

    impl Default for Item {
        fn default() -> Self {
            Self {
                kinds: EventKind::CREATE,
                dms: false,
                enabled: true,
                owner_only: false,
                perms: Permissions::empty(),
            }
        }
    }

    impl Gated for Item {
        fn allowed_kinds(&self) -> EventKind {
            self.kinds
        }
        fn allows_dms(&self) -> bool {
            self.dms
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn owner_only(&self) -> bool {
            self.owner_only
        }
        fn required_permissions(&self) -> Permissions {
            self.perms
        }
    }

    fn event(kind: EventKind, origin: Origin) -> (Arc<RecordingResponder>, Event) {
        let responder = RecordingResponder::new();
        let event = Event::new(kind, origin, ".x", responder.clone().boxed());
        (responder, event)
    }

    #[test]
    fn test_filter_kind_and_dm() {
        let (_, guild_update) = event(EventKind::UPDATE, Origin::guild("c", "g", "u"));
        let (_, dm) = event(EventKind::CREATE, Origin::direct("c", "u"));

        let item = Item::default();
        assert!(matches!(
            filter(&item, &guild_update),
            Err(Rejection::WrongKind { .. })
        ));
        assert_eq!(filter(&item, &dm), Err(Rejection::DirectMessage));

        let dm_item = Item {
            dms: true,
            ..Default::default()
        };
        assert_eq!(filter(&dm_item, &dm), Ok(()));

        let disabled = Item {
            dms: true,
            enabled: false,
            ..Default::default()
        };
        assert_eq!(filter(&disabled, &dm), Err(Rejection::Disabled));
    }

    #[tokio::test]
    async fn test_authorize_owner_only() {
        let (_, e) = event(EventKind::CREATE, Origin::guild("c", "g", "u1"));
        let item = Item {
            owner_only: true,
            ..Default::default()
        };

        let owners: HashSet<String> = ["u1".to_string()].into();
        assert_eq!(authorize(&item, &e, &owners, true).await, Ok(()));
        assert_eq!(
            authorize(&item, &e, &HashSet::new(), true).await,
            Err(Rejection::OwnerOnly)
        );
    }

    #[tokio::test]
    async fn test_authorize_author_and_bot_permissions() {
        let (responder, e) = event(EventKind::CREATE, Origin::guild("c", "g", "u1"));
        let item = Item {
            perms: Permissions::BAN_MEMBERS,
            ..Default::default()
        };
        let owners = HashSet::new();

        assert_eq!(
            authorize(&item, &e, &owners, true).await,
            Err(Rejection::MissingPermissions(Permissions::BAN_MEMBERS))
        );

        responder.set_author_permissions("u1", Permissions::BAN_MEMBERS);
        assert_eq!(authorize(&item, &e, &owners, true).await, Ok(()));

        responder.set_bot_permissions(Permissions::SEND_MESSAGES);
        assert_eq!(
            authorize(&item, &e, &owners, true).await,
            Err(Rejection::BotMissingPermissions(Permissions::BAN_MEMBERS))
        );
        assert_eq!(authorize(&item, &e, &owners, false).await, Ok(()));
    }
}
