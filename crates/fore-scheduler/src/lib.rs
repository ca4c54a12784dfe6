//! When posts go out: the time-slot allocator picks a free slot for new posts
//! and the [`Poller`] hands due posts to the publishing pipeline.

pub mod engine;
pub mod error;
pub mod slot;

pub use engine::{Poller, TickReport};
pub use error::{Result, SchedulerError};
pub use slot::{next_slot, quick_pick, QuickPick, SlotAllocator};
