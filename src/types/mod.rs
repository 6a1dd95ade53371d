//! Core types for the Lockstep runtime.
//!
//! This module contains the fundamental types used throughout the runtime:
//!
//! - [`id`]: Identifier types (`ProcessId`, `ChannelId`)
//! - [`time`]: Logical timestamps and durations, including the `NEVER` top
//!   element
//! - [`value`]: The channel value model (`Key`, `Value`, `Record`)

pub mod id;
pub mod time;
pub mod value;

pub use id::{ChannelId, ProcessId};
pub use time::{Duration, LogicalTime};
pub use value::{Key, Record, Value};
