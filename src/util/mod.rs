//! Internal utilities.
//!
//! - [`arena`]: generational slot arena backing process, channel, and
//!   priority-node storage
//! - [`heap`]: deterministic binary min-queue with an explicit ordering
//!   callback and linear reposition

pub mod arena;
pub mod heap;

pub use arena::{Arena, ArenaIndex};
pub use heap::MinQueue;
