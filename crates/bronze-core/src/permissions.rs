//! Permission bits for policy checks.
//!
//! The bit layout follows the common chat-platform convention (one bit per
//! capability in a 64-bit field) so responders can usually pass platform
//! values straight through with [`Permissions::from_bits_truncate`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// A set of permissions held by (or required from) a member in a channel.
    ///
    /// | Permission | Typical use |
    /// |------------|-------------|
    /// | [`KICK_MEMBERS`](Self::KICK_MEMBERS) | `kick` |
    /// | [`BAN_MEMBERS`](Self::BAN_MEMBERS) | `ban`, `unban` |
    /// | [`ADMINISTRATOR`](Self::ADMINISTRATOR) | implies every other bit |
    /// | [`MANAGE_MESSAGES`](Self::MANAGE_MESSAGES) | content filters, purges |
    /// | [`MANAGE_GUILD`](Self::MANAGE_GUILD) | per-guild settings |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS          = 1 << 1;
        const BAN_MEMBERS           = 1 << 2;
        const ADMINISTRATOR         = 1 << 3;
        const MANAGE_CHANNELS       = 1 << 4;
        const MANAGE_GUILD          = 1 << 5;
        const ADD_REACTIONS         = 1 << 6;
        const VIEW_AUDIT_LOG        = 1 << 7;
        const VIEW_CHANNEL          = 1 << 10;
        const SEND_MESSAGES         = 1 << 11;
        const MANAGE_MESSAGES       = 1 << 13;
        const EMBED_LINKS           = 1 << 14;
        const ATTACH_FILES          = 1 << 15;
        const READ_MESSAGE_HISTORY  = 1 << 16;
        const MENTION_EVERYONE      = 1 << 17;
        const MANAGE_NICKNAMES      = 1 << 27;
        const MANAGE_ROLES          = 1 << 28;
        const MODERATE_MEMBERS      = 1 << 40;
    }
}

impl Permissions {
    /// Returns `true` when `self` grants everything in `required`.
    ///
    /// `ADMINISTRATOR` satisfies any requirement.
    pub fn satisfies(self, required: Permissions) -> bool {
        self.contains(Permissions::ADMINISTRATOR) || self.contains(required)
    }

    /// Returns the bits of `required` that `self` does not grant.
    ///
    /// Empty when [`satisfies`](Self::satisfies) would return `true`.
    pub fn missing(self, required: Permissions) -> Permissions {
        if self.contains(Permissions::ADMINISTRATOR) {
            Permissions::empty()
        } else {
            required - self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_exact_bits() {
        let held = Permissions::BAN_MEMBERS | Permissions::KICK_MEMBERS;
        assert!(held.satisfies(Permissions::BAN_MEMBERS));
        assert!(held.satisfies(Permissions::empty()));
        assert!(!held.satisfies(Permissions::MANAGE_GUILD));
    }

    #[test]
    fn test_administrator_satisfies_everything() {
        let held = Permissions::ADMINISTRATOR;
        assert!(held.satisfies(Permissions::BAN_MEMBERS | Permissions::MANAGE_ROLES));
        assert!(held.missing(Permissions::all()).is_empty());
    }

    #[test]
    fn test_missing_reports_only_absent_bits() {
        let held = Permissions::SEND_MESSAGES;
        let missing = held.missing(Permissions::SEND_MESSAGES | Permissions::EMBED_LINKS);
        assert_eq!(missing, Permissions::EMBED_LINKS);
    }
}
