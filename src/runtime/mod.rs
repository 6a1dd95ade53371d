//! The scheduler driver.
//!
//! [`Runtime`] owns the scheduler state and exposes the two layers of the
//! public surface:
//!
//! - the convenience entry point [`Runtime::start`], which installs a root
//!   process, runs the first instant, and drives the tick loop until no
//!   active process remains or no update is scheduled;
//! - the backend driver surface ([`Runtime::set_start`],
//!   [`Runtime::run_instant`], [`Runtime::set_time`],
//!   [`Runtime::next_event_time`], [`Runtime::num_active`],
//!   [`Runtime::schedule_update`]) for real-time wrappers that map logical
//!   instants onto a wall clock and inject external events.
//!
//! An *instant* first commits every channel update due at the current
//! time, then resumes ready processes in strict priority order until none
//! remain. The tick loop advances the clock to the earliest scheduled
//! update and repeats.

mod state;

pub(crate) use state::RuntimeState;

use crate::cx::Cx;
use crate::error::{Error, ErrorKind, Result};
use crate::process::ProcessState;
use crate::tracing_compat::debug;
use crate::types::{ChannelId, Key, LogicalTime, ProcessId, Record, Value};
use core::fmt;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Wakes are driven by the scheduler's own queues, so polled continuations
/// get a waker that does nothing.
struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// A deterministic synchronous-sequential runtime instance.
///
/// Single-threaded and not re-entrant: one root process per runtime.
pub struct Runtime {
    state: Rc<RefCell<RuntimeState>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime whose clock starts at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(LogicalTime::ZERO)
    }

    /// Creates a runtime whose clock starts at a backend-supplied time.
    #[must_use]
    pub fn starting_at(start: LogicalTime) -> Self {
        Self {
            state: Rc::new(RefCell::new(RuntimeState::new(start))),
        }
    }

    // === Convenience entry point ===

    /// Runs `entry` as the root process to completion.
    ///
    /// Installs the root, executes the first instant, then drives the tick
    /// loop until no active process remains or the next scheduled update is
    /// `NEVER`. Returns the final logical time and the root's return
    /// values.
    pub fn start<F, Fut>(&self, entry: F) -> Result<(LogicalTime, Vec<Value>)>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Vec<Value>> + 'static,
    {
        let ret = self.set_start(entry)?;
        self.run_instant();
        let end = self.run()?;
        Ok((end, self.returns(ret)))
    }

    /// Drives the tick loop: advance to the next scheduled update and run
    /// that instant, until no active process remains or nothing is
    /// scheduled. Returns the final logical time.
    pub fn run(&self) -> Result<LogicalTime> {
        loop {
            let (active, at) = {
                let st = self.state.borrow();
                (st.active, st.next_event_time())
            };
            if active == 0 {
                debug!("no active process remains; runtime is done");
                break;
            }
            if at.is_never() {
                debug!("no further update is scheduled; runtime is done");
                break;
            }
            self.set_time(at)?;
            self.run_instant();
        }
        Ok(self.now())
    }

    // === Backend driver surface ===

    /// Installs `entry` as the root process without running it.
    ///
    /// Returns the root's return channel. Fails with [`ErrorKind::Usage`]
    /// if a root was already installed; re-entrant start is not supported.
    pub fn set_start<F, Fut>(&self, entry: F) -> Result<ChannelId>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Vec<Value>> + 'static,
    {
        let (pid, ret) = {
            let mut st = self.state.borrow_mut();
            if st.started {
                return Err(
                    Error::new(ErrorKind::Usage).with_context("runtime was already started")
                );
            }
            st.started = true;
            let priority = st.priorities.new_base()?;
            let ret = st.create_channel(Record::new());
            let pid = st.create_process(ProcessState::Ready, priority, Some(ret));
            (pid, ret)
        };
        let body = entry(Cx::new(Rc::downgrade(&self.state), pid));
        let mut st = self.state.borrow_mut();
        st.install_continuation(pid, Box::pin(body));
        st.enqueue_ready(pid);
        debug!(root = %pid, "root process installed");
        Ok(ret)
    }

    /// Executes one instant at the current logical time: commit all due
    /// channel updates, then resume ready processes in priority order
    /// until the run stack and run queue are both empty.
    pub fn run_instant(&self) {
        self.state.borrow_mut().commit_due();
        loop {
            let next = self.state.borrow_mut().dequeue_next();
            let Some(pid) = next else { break };
            self.resume(pid);
        }
    }

    /// Advances the logical clock. Strictly monotone.
    pub fn set_time(&self, at: LogicalTime) -> Result<()> {
        self.state.borrow_mut().set_time(at)
    }

    /// Injects an external update, scheduled at the strictly-future time
    /// `at`. Intended for real-time backends feeding I/O into channels.
    pub fn schedule_update(
        &self,
        chan: ChannelId,
        at: LogicalTime,
        key: Key,
        value: Value,
    ) -> Result<()> {
        self.state.borrow_mut().schedule_update(chan, at, key, value)
    }

    // === Queries ===

    /// The current logical time.
    #[must_use]
    pub fn now(&self) -> LogicalTime {
        self.state.borrow().now
    }

    /// The earliest scheduled update time, or `NEVER`.
    #[must_use]
    pub fn next_event_time(&self) -> LogicalTime {
        self.state.borrow().next_event_time()
    }

    /// Number of live processes counting toward liveness.
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.state.borrow().active
    }

    /// Allocates a channel from the driver side.
    #[must_use]
    pub fn channel(&self, init: Record) -> ChannelId {
        self.state.borrow_mut().create_channel(init)
    }

    /// Reads a channel field.
    #[must_use]
    pub fn get(&self, chan: ChannelId, key: &Key) -> Option<Value> {
        self.state.borrow().channel(chan).get(key).cloned()
    }

    /// Last commit time of one field (`Some(key)`) or of the whole channel
    /// (`None`).
    #[must_use]
    pub fn last_updated(&self, chan: ChannelId, key: Option<&Key>) -> Option<LogicalTime> {
        self.state.borrow().channel(chan).last_updated(key)
    }

    /// Returns true if `pid` is sensitized to `chan`.
    #[must_use]
    pub fn is_sensitized(&self, chan: ChannelId, pid: ProcessId) -> bool {
        self.state.borrow().is_sensitized(pid, chan)
    }

    /// Returns true once the process owning `chan` as its return channel
    /// has terminated.
    #[must_use]
    pub fn terminated(&self, chan: ChannelId) -> bool {
        self.get(chan, &Key::terminated()) == Some(Value::Bool(true))
    }

    /// Collects the return values posted to a return channel: the values
    /// at numeric keys `0..n`.
    #[must_use]
    pub fn returns(&self, chan: ChannelId) -> Vec<Value> {
        let st = self.state.borrow();
        let rec = st.channel(chan);
        let mut out = Vec::new();
        let mut i = 0u64;
        while let Some(v) = rec.get(&Key::Index(i)) {
            out.push(v.clone());
            i += 1;
        }
        out
    }

    // === Auditing ===

    /// Checks the universal scheduler invariants and returns any
    /// violations. Intended for tests and harnesses; an empty result after
    /// every step is the expected steady state.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let st = self.state.borrow();
        let mut violations = Vec::new();

        // Channel side: cached earliest and event-queue membership.
        for (idx, rec) in st.channels.iter() {
            let chan = ChannelId::from_arena(idx);
            let actual = rec
                .pending
                .values()
                .map(|(at, _)| *at)
                .min()
                .unwrap_or(LogicalTime::NEVER);
            if rec.earliest != actual {
                violations.push(InvariantViolation::EarliestMismatch {
                    channel: chan,
                    cached: rec.earliest,
                    actual,
                });
            }
            let entries = st.event_queue.count(&chan);
            if usize::from(rec.queued) != entries {
                violations.push(InvariantViolation::EventQueueMembership {
                    channel: chan,
                    queued: rec.queued,
                    entries,
                });
            }
        }

        // Process side: run-queue membership and the active count.
        let mut active = 0usize;
        for (_, rec) in st.processes.iter() {
            let pid = rec.id;
            if rec.active {
                active += 1;
            }
            let entries =
                st.run_queue.count(&pid) + st.run_stack.iter().filter(|p| **p == pid).count();
            if usize::from(rec.queued) != entries {
                violations.push(InvariantViolation::RunQueueMembership {
                    process: pid,
                    queued: rec.queued,
                    entries,
                });
            }
        }
        if active != st.active {
            violations.push(InvariantViolation::ActiveCountMismatch {
                counted: active,
                recorded: st.active,
            });
        }

        // Priority side: live processes must be pairwise ordered.
        let pids: Vec<(ProcessId, crate::priority::Priority)> = st
            .processes
            .iter()
            .map(|(_, rec)| (rec.id, rec.priority))
            .collect();
        for (i, (pa, a)) in pids.iter().enumerate() {
            for (pb, b) in &pids[i + 1..] {
                let ordered = matches!(
                    (st.priorities.lt(*a, *b), st.priorities.lt(*b, *a)),
                    (Ok(true), Ok(false)) | (Ok(false), Ok(true))
                );
                if !ordered {
                    violations.push(InvariantViolation::UnorderedPriorities {
                        first: *pa,
                        second: *pb,
                    });
                }
            }
        }

        violations
    }

    /// Resumes one process: take its continuation, poll it once, and
    /// either store it back (suspended) or retire the process
    /// (terminated).
    fn resume(&self, pid: ProcessId) {
        let mut continuation = {
            let mut st = self.state.borrow_mut();
            st.running = Some(pid);
            st.processes
                .get_mut(pid.arena_index())
                .expect("dequeued process is live")
                .continuation
                .take()
                .expect("ready process has a stored body")
        };
        let waker = Waker::from(Arc::new(NoopWake));
        let mut task_cx = Context::from_waker(&waker);
        let poll = continuation.as_mut().poll(&mut task_cx);
        let mut st = self.state.borrow_mut();
        st.running = None;
        match poll {
            Poll::Ready(values) => st.finish(pid, values),
            Poll::Pending => {
                st.processes
                    .get_mut(pid.arena_index())
                    .expect("suspended process is live")
                    .continuation = Some(continuation);
            }
        }
    }

}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Runtime")
            .field("now", &st.now)
            .field("active", &st.active)
            .field("processes", &st.processes.len())
            .field("channels", &st.channels.len())
            .field("next_event", &st.next_event_time())
            .finish()
    }
}

/// A broken scheduler invariant found by [`Runtime::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A channel's cached `earliest` disagrees with its pending updates.
    EarliestMismatch {
        /// The offending channel.
        channel: ChannelId,
        /// The cached minimum.
        cached: LogicalTime,
        /// The recomputed minimum.
        actual: LogicalTime,
    },
    /// A channel's queued flag disagrees with the event queue.
    EventQueueMembership {
        /// The offending channel.
        channel: ChannelId,
        /// The record's flag.
        queued: bool,
        /// How many event-queue entries hold the channel.
        entries: usize,
    },
    /// A process's queued flag disagrees with the run stack and run queue.
    RunQueueMembership {
        /// The offending process.
        process: ProcessId,
        /// The record's flag.
        queued: bool,
        /// How many run-stack/run-queue entries hold the process.
        entries: usize,
    },
    /// The active counter disagrees with the per-process flags.
    ActiveCountMismatch {
        /// Count derived from process records.
        counted: usize,
        /// The scheduler's counter.
        recorded: usize,
    },
    /// Two live processes do not have strictly ordered priorities.
    UnorderedPriorities {
        /// First process.
        first: ProcessId,
        /// Second process.
        second: ProcessId,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarliestMismatch {
                channel,
                cached,
                actual,
            } => write!(f, "{channel}: cached earliest {cached}, actual {actual}"),
            Self::EventQueueMembership {
                channel,
                queued,
                entries,
            } => write!(f, "{channel}: queued={queued} but {entries} queue entries"),
            Self::RunQueueMembership {
                process,
                queued,
                entries,
            } => write!(f, "{process}: queued={queued} but {entries} queue entries"),
            Self::ActiveCountMismatch { counted, recorded } => {
                write!(f, "active count {recorded} but {counted} active processes")
            }
            Self::UnorderedPriorities { first, second } => {
                write!(f, "{first} and {second} are not strictly ordered")
            }
        }
    }
}
