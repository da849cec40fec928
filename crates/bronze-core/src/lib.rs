//! # Bronze Core
//!
//! The data model shared by every layer of the Bronze command dispatcher.
//!
//! This crate provides:
//! - **Events**: the normalized inbound occurrence ([`Event`]), its kind
//!   mask ([`EventKind`]) and origin ([`Origin`])
//! - **Permissions**: the bitmask used by permission policies ([`Permissions`])
//! - **Responder**: the outbound capability a gateway client supplies with
//!   each event ([`Responder`], [`Reply`])
//! - **Testing**: a recording responder for unit tests, behind the
//!   `testing` feature
//!
//! ```text
//! ┌──────────────┐  Event   ┌────────────┐  Arc<Event>  ┌───────────┐
//! │ Gateway      │─────────▶│ Dispatcher │─────────────▶│  Handler  │
//! │ client       │◀─────────│            │              │           │
//! └──────────────┘ Responder└────────────┘              └───────────┘
//! ```
//!
//! The core never interprets platform wire formats; the gateway client keeps
//! the raw payload on the event for handlers that need it.

pub mod error;
pub mod event;
pub mod permissions;
pub mod responder;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ApiError, ApiResult};
pub use event::{Event, EventKind, Origin};
pub use permissions::Permissions;
pub use responder::{BoxedResponder, Embed, EmbedField, MessageId, Reply, Responder};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        ApiError, ApiResult, BoxedResponder, Embed, Event, EventKind, Origin, Permissions, Reply,
        Responder,
    };
}
