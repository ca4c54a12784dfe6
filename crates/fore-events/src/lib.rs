//! Real-time post status fan-out.
//!
//! The engine publishes [`Event`]s into an [`EventBroadcaster`]; each
//! connected client holds a [`Subscription`] that yields `connected` first,
//! then `post_update`s as they happen, interleaved with periodic `heartbeat`s.

pub mod broadcast;
pub mod event;

pub use broadcast::{EventBroadcaster, Subscription};
pub use event::{Event, PostView};
