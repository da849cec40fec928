//! Per-key rate limiting.
//!
//! [`CooldownManager`] maps caller-built string keys to expiry instants. It
//! knows nothing about commands or scopes; the convention of building keys
//! as `{scope}:{scope-id}:{command}` lives in [`CooldownScope::key`].
//!
//! Each active key owns a one-shot timer task that removes it on expiry, so
//! the map only ever holds live cooldowns and nothing sweeps it.
//!
//! ```rust,ignore
//! let cooldowns = CooldownManager::new();
//! cooldowns.set("channel:1:ping", Duration::from_secs(5));
//!
//! if let Some(remaining) = cooldowns.check("channel:1:ping") {
//!     println!("wait {remaining:?}");
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

use bronze_core::Event;

/// The granularity at which a command's cooldown key is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownScope {
    /// No cooldown key; the command is never rate limited.
    #[default]
    None,
    /// One cooldown per author.
    User,
    /// One cooldown per channel.
    Channel,
    /// One cooldown per guild. Direct messages fall back to the channel id.
    Guild,
}

impl CooldownScope {
    /// Builds the cooldown key for `command` triggered by `event`.
    ///
    /// Returns `None` for [`CooldownScope::None`].
    pub fn key(self, event: &Event, command: &str) -> Option<String> {
        let (scope, id) = match self {
            CooldownScope::None => return None,
            CooldownScope::User => ("user", event.author_id()),
            CooldownScope::Channel => ("channel", event.channel_id()),
            CooldownScope::Guild => (
                "guild",
                event
                    .guild_id()
                    .filter(|g| !g.is_empty())
                    .unwrap_or(event.channel_id()),
            ),
        };
        Some(format!("{scope}:{id}:{command}"))
    }
}

struct CooldownEntry {
    expires_at: Instant,
    generation: u64,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct CooldownState {
    entries: HashMap<String, CooldownEntry>,
    next_generation: u64,
}

/// Tracks active cooldowns with per-key expiry timers.
///
/// Cloning is cheap and clones share state.
#[derive(Clone, Default)]
pub struct CooldownManager {
    state: Arc<Mutex<CooldownState>>,
}

impl CooldownManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `key` on cooldown for `duration`, replacing any existing entry.
    ///
    /// A zero duration is a no-op. The expiry timer is spawned on the current
    /// Tokio runtime; outside a runtime the entry still expires logically
    /// (see [`check`](Self::check)) but stays in the map until it is removed
    /// or replaced.
    pub fn set(&self, key: impl Into<String>, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut state = self.state.lock();
        self.insert(&mut state, key.into(), duration);
    }

    /// Checks and sets `key` under one lock.
    ///
    /// Returns the remaining time if `key` is already on cooldown; otherwise
    /// puts it on cooldown for `duration` and returns `None`.
    pub fn try_set(&self, key: impl Into<String>, duration: Duration) -> Option<Duration> {
        let key = key.into();
        let mut state = self.state.lock();
        if let Some(remaining) = remaining(&state, &key) {
            return Some(remaining);
        }
        if !duration.is_zero() {
            self.insert(&mut state, key, duration);
        }
        None
    }

    fn insert(&self, state: &mut CooldownState, key: String, duration: Duration) {
        let expires_at = Instant::now() + duration;
        state.next_generation += 1;
        let generation = state.next_generation;

        let timer = match Handle::try_current() {
            Ok(handle) => {
                let weak = Arc::downgrade(&self.state);
                let timer_key = key.clone();
                let task = handle.spawn(async move {
                    tokio::time::sleep_until(expires_at).await;
                    expire(&weak, &timer_key, generation);
                });
                Some(task.abort_handle())
            }
            Err(_) => {
                warn!(key = %key, "No Tokio runtime, cooldown will not be swept on expiry");
                None
            }
        };

        let previous = state.entries.insert(
            key,
            CooldownEntry {
                expires_at,
                generation,
                timer,
            },
        );
        if let Some(timer) = previous.and_then(|p| p.timer) {
            timer.abort();
        }
    }

    /// Returns the remaining time if `key` is on cooldown.
    ///
    /// An entry whose expiry has passed but whose timer has not yet run is
    /// reported as inactive and left untouched.
    pub fn check(&self, key: &str) -> Option<Duration> {
        remaining(&self.state.lock(), key)
    }

    /// Returns `true` if `key` is on cooldown.
    pub fn is_active(&self, key: &str) -> bool {
        self.check(key).is_some()
    }

    /// Clears `key` early. Returns `true` if an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.state.lock().entries.remove(key);
        match removed {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Number of entries currently held, including logically expired ones
    /// whose timer has not fired yet.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry and cancels their timers.
    pub fn clear(&self) {
        let drained: Vec<CooldownEntry> = self.state.lock().entries.drain().map(|(_, e)| e).collect();
        for timer in drained.into_iter().filter_map(|e| e.timer) {
            timer.abort();
        }
    }
}

fn remaining(state: &CooldownState, key: &str) -> Option<Duration> {
    let entry = state.entries.get(key)?;
    let remaining = entry.expires_at.saturating_duration_since(Instant::now());
    (!remaining.is_zero()).then_some(remaining)
}

/// Timer callback: removes `key` unless it was replaced since the timer started.
fn expire(state: &Weak<Mutex<CooldownState>>, key: &str, generation: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    if state
        .entries
        .get(key)
        .is_some_and(|entry| entry.generation == generation)
    {
        state.entries.remove(key);
        trace!(key = %key, "Cooldown expired");
    }
}

impl std::fmt::Debug for CooldownManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownManager")
            .field("active", &self.len())
            .finish()
    }
}
