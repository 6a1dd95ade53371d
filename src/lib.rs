//! Lockstep: a deterministic, discrete-event runtime for the synchronous
//! sequential model of computation.
//!
//! # Overview
//!
//! Programs are sets of cooperating logical processes that communicate only
//! through *channel tables*: shared records whose updates are totally
//! ordered in logical time. The runtime advances a global logical clock by
//! discrete instants; within an instant, processes run one at a time in
//! strict priority order. Given identical inputs and program structure, the
//! interleaving of processes, the order of updates, and the final
//! observable state are bit-for-bit reproducible.
//!
//! # Core guarantees
//!
//! - **Determinism**: scheduling is a pure function of program structure;
//!   there is no wall clock, no thread scheduler, and no randomness in the
//!   core.
//! - **Instant atomicity**: all work scheduled at a logical time happens
//!   before the clock moves; a process never observes an update scheduled
//!   for time `t` before the clock reads `t`.
//! - **Priority order**: within an instant, the runnable process with the
//!   highest priority always runs next. Priorities form a total order
//!   maintained with amortized-logarithmic insertion and constant-time
//!   comparison.
//! - **No data races by construction**: exactly one process executes at any
//!   moment and all shared state is channel fields.
//!
//! # Module structure
//!
//! - [`types`]: identifiers, logical time, and the channel value model
//! - [`priority`]: the order-maintenance structure behind process priorities
//! - [`runtime`]: scheduler state and the public [`runtime::Runtime`] driver
//! - [`cx`]: the in-process capability handle ([`cx::Cx`]) with `spawn`,
//!   `defer`, `wait`, and `after`
//! - [`util`]: generational arena and the deterministic min-queue
//! - [`error`](mod@error): error types
//!
//! # Example
//!
//! ```
//! use lockstep::cx::Cx;
//! use lockstep::runtime::Runtime;
//! use lockstep::types::{Duration, Value};
//! use lockstep::record;
//!
//! let rt = Runtime::new();
//! let (end, returns) = rt
//!     .start(|cx: Cx| async move {
//!         let ch = cx.channel(record! { "beats" => Value::Int(0) });
//!         cx.after(Duration::from_ticks(3), ch, "beats".into(), Value::Int(1))
//!             .unwrap();
//!         cx.wait_one(ch).await;
//!         vec![cx.get(ch, &"beats".into()).unwrap()]
//!     })
//!     .unwrap();
//! assert_eq!(end.as_ticks(), 3);
//! assert_eq!(returns, vec![Value::Int(1)]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod cx;
pub mod error;
pub mod priority;
pub mod runtime;
pub mod tracing_compat;
pub mod types;
pub mod util;

mod channel;
mod process;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use cx::{Cx, WaitSpec};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use runtime::{InvariantViolation, Runtime};
pub use types::{ChannelId, Duration, Key, LogicalTime, ProcessId, Record, Value};
