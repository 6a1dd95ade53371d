//! Process records.
//!
//! A process is a suspendable execution context: a stored continuation, a
//! position in the priority order, an optional return channel, an
//! active-count contribution, and the list of deferred children it will
//! release at its next suspension point.

use crate::priority::Priority;
use crate::types::{ChannelId, ProcessId, Value};
use core::fmt;
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;

/// A stored process body, resumed by the scheduler until it suspends or
/// terminates. The output becomes the process's return values.
pub(crate) type Continuation = Pin<Box<dyn Future<Output = Vec<Value>>>>;

/// The lifecycle of a process.
///
/// `Created` children sit in their parent's deferred list until released.
/// A process is in the run stack or run queue iff `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessState {
    /// Deferred child: exists but has never been enqueued.
    Created,
    /// In the run stack or run queue.
    Ready,
    /// Currently executing.
    Running,
    /// Suspended in a wait.
    Waiting,
}

/// One live process.
pub(crate) struct ProcessRecord {
    pub id: ProcessId,
    pub state: ProcessState,
    /// Taken out while the scheduler polls it.
    pub continuation: Option<Continuation>,
    pub priority: Priority,
    /// Where return values and the terminated flag are posted.
    pub ret: Option<ChannelId>,
    /// Whether this process counts toward runtime liveness.
    pub active: bool,
    /// True iff currently in the run stack or run queue.
    pub queued: bool,
    /// Children created by `defer`, released at the next suspension point
    /// in creation order.
    pub deferred: SmallVec<[ProcessId; 4]>,
}

impl ProcessRecord {
    /// Creates a record without a body; the continuation is installed once
    /// the process id exists, because the body's capability handle embeds
    /// that id.
    pub fn new(
        id: ProcessId,
        state: ProcessState,
        priority: Priority,
        ret: Option<ChannelId>,
    ) -> Self {
        Self {
            id,
            state,
            continuation: None,
            priority,
            ret,
            active: true,
            queued: false,
            deferred: SmallVec::new(),
        }
    }
}

impl fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("priority", &self.priority)
            .field("ret", &self.ret)
            .field("active", &self.active)
            .field("queued", &self.queued)
            .field("deferred", &self.deferred)
            .field(
                "continuation",
                &self.continuation.as_ref().map(|_| "<stored>"),
            )
            .finish()
    }
}
