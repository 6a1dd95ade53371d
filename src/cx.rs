//! The in-process capability handle.
//!
//! Every process body receives a [`Cx`]: its only doorway to the runtime.
//! Through it a process reads and writes channels, schedules delayed
//! updates, spawns and defers children, waits on channel updates, and
//! toggles its own liveness contribution.
//!
//! `Cx` holds a weak reference to the scheduler state; process bodies are
//! owned by the runtime, so the reference is live for as long as a body
//! can run. All suspension points are futures defined here. Awaiting
//! anything else inside a process body will strand it, because the
//! runtime's waker is inert.

use crate::error::{Error, ErrorKind, Result};
use crate::process::ProcessState;
use crate::runtime::RuntimeState;
use crate::tracing_compat::trace;
use crate::types::{ChannelId, Duration, Key, LogicalTime, ProcessId, Record, Value};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// The capability handle passed to every process body.
///
/// Cloneable; clones refer to the same process.
#[derive(Clone)]
pub struct Cx {
    state: Weak<RefCell<RuntimeState>>,
    pid: ProcessId,
}

impl Cx {
    pub(crate) fn new(state: Weak<RefCell<RuntimeState>>, pid: ProcessId) -> Self {
        Self { state, pid }
    }

    /// The same capability rebound to another process id.
    fn for_process(&self, pid: ProcessId) -> Self {
        Self {
            state: self.state.clone(),
            pid,
        }
    }

    /// Upgrades the state handle. A process body can only run while the
    /// runtime that owns it is alive, so failure is a fatal usage error.
    fn state(&self) -> Rc<RefCell<RuntimeState>> {
        self.state
            .upgrade()
            .expect("process capability used after its runtime was dropped")
    }

    /// This process's id.
    #[must_use]
    pub const fn id(&self) -> ProcessId {
        self.pid
    }

    // === Queries ===

    /// The current logical time.
    #[must_use]
    pub fn now(&self) -> LogicalTime {
        self.state().borrow().now
    }

    /// The earliest scheduled update time, or `NEVER`.
    #[must_use]
    pub fn next_event_time(&self) -> LogicalTime {
        self.state().borrow().next_event_time()
    }

    /// Number of live processes counting toward liveness.
    #[must_use]
    pub fn num_active(&self) -> usize {
        self.state().borrow().active
    }

    /// Returns true while this process is sensitized to `chan`.
    #[must_use]
    pub fn sensitized(&self, chan: ChannelId) -> bool {
        self.state().borrow().is_sensitized(self.pid, chan)
    }

    // === Channels ===

    /// Allocates a channel, stamping every initial field at the current
    /// time.
    #[must_use]
    pub fn channel(&self, init: Record) -> ChannelId {
        self.state().borrow_mut().create_channel(init)
    }

    /// Reads a channel field.
    #[must_use]
    pub fn get(&self, chan: ChannelId, key: &Key) -> Option<Value> {
        self.state().borrow().channel(chan).get(key).cloned()
    }

    /// Instant assignment: makes `key = value` visible immediately and
    /// wakes sensitized processes of strictly lower priority than this
    /// one. Equal-or-higher-priority watchers already ran this instant and
    /// stay sensitized.
    pub fn set(&self, chan: ChannelId, key: Key, value: Value) {
        self.state()
            .borrow_mut()
            .assign(self.pid, chan, key, value);
    }

    /// Instant deletion: removes `key` and its commit stamp, waking like a
    /// write.
    pub fn delete(&self, chan: ChannelId, key: &Key) {
        self.state().borrow_mut().delete_field(self.pid, chan, key);
    }

    /// Last commit time of one field (`Some(key)`) or of the whole channel
    /// (`None`).
    #[must_use]
    pub fn last_updated(&self, chan: ChannelId, key: Option<&Key>) -> Option<LogicalTime> {
        self.state().borrow().channel(chan).last_updated(key)
    }

    /// Schedules `key = value` on `chan` after the strictly positive
    /// `delay`.
    pub fn after(&self, delay: Duration, chan: ChannelId, key: Key, value: Value) -> Result<()> {
        if delay.is_zero() {
            return Err(
                Error::new(ErrorKind::Temporal).with_context("delay must be strictly positive")
            );
        }
        let rc = self.state();
        let mut st = rc.borrow_mut();
        let at = st.now + delay;
        st.schedule_update(chan, at, key, value)
    }

    // === Liveness ===

    /// Stops counting this process toward runtime liveness. For handler
    /// processes that block on external events and must not keep the
    /// runtime alive by themselves.
    pub fn set_passive(&self) {
        self.state()
            .borrow_mut()
            .set_process_active(self.pid, false);
    }

    /// Resumes counting this process toward runtime liveness.
    pub fn set_active(&self) {
        self.state().borrow_mut().set_process_active(self.pid, true);
    }

    // === Process control ===

    /// Spawns a child that runs immediately, within this instant.
    ///
    /// The child takes over this process's current priority and this
    /// process moves to a fresh slot just after it, so the child outranks
    /// the parent and every other pending process the parent outranked.
    /// Awaiting the returned future performs the hand-off and yields; the
    /// child runs until it suspends or terminates, then control comes back
    /// here. Resolves to the child's return channel.
    pub fn spawn<F, Fut>(&self, body: F) -> Spawn<F>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Vec<Value>> + 'static,
    {
        Spawn {
            cx: self.clone(),
            body: Some(body),
            ret: None,
        }
    }

    /// Creates a child that launches only when this process next suspends
    /// or terminates. No yield happens now.
    ///
    /// The child's priority is allocated just after this process's current
    /// one, so deferred children run after the parent, and a later defer
    /// outranks an earlier one once released. Returns the child's return
    /// channel immediately.
    pub fn defer<F, Fut>(&self, body: F) -> ChannelId
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Vec<Value>> + 'static,
    {
        let rc = self.state();
        let (child, ret) = {
            let mut st = rc.borrow_mut();
            let parent_priority = st
                .processes
                .get(self.pid.arena_index())
                .expect("live process")
                .priority;
            let child_priority = st
                .priorities
                .insert_after(parent_priority)
                .expect("priority label span exhausted");
            let ret = st.create_channel(Record::new());
            let child = st.create_process(ProcessState::Created, child_priority, Some(ret));
            (child, ret)
        };
        let fut = body(self.for_process(child));
        let mut st = rc.borrow_mut();
        st.install_continuation(child, Box::pin(fut));
        st.processes
            .get_mut(self.pid.arena_index())
            .expect("live process")
            .deferred
            .push(child);
        trace!(parent = %self.pid, child = %child, "deferred child created");
        ret
    }

    /// Waits until at least one spec is satisfied.
    ///
    /// A [`WaitSpec::One`] is satisfied when its channel has been updated
    /// since the wait began; a [`WaitSpec::All`] when all of its channels
    /// have been, accumulating across instants. Resolves to one boolean
    /// per spec, positionally. Waiting on nothing resolves immediately.
    ///
    /// Deferred children are released just before the first yield.
    pub fn wait<I>(&self, specs: I) -> Wait
    where
        I: IntoIterator<Item = WaitSpec>,
    {
        Wait {
            cx: self.clone(),
            specs: specs.into_iter().collect(),
            tracked: Vec::new(),
            begun: false,
        }
    }

    /// Waits for the next update to a single channel.
    pub fn wait_one(&self, chan: ChannelId) -> Wait {
        self.wait([WaitSpec::One(chan)])
    }
}

impl core::fmt::Debug for Cx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cx").field("pid", &self.pid).finish()
    }
}

/// One condition of a [`Cx::wait`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitSpec {
    /// Satisfied when the channel has been updated.
    One(ChannelId),
    /// Satisfied when every channel has been updated, not necessarily in
    /// the same instant.
    All(Vec<ChannelId>),
}

impl WaitSpec {
    /// Builds an all-of spec.
    #[must_use]
    pub fn all(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        Self::All(channels.into_iter().collect())
    }

    fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        match self {
            Self::One(c) => std::slice::from_ref(c).iter().copied(),
            Self::All(cs) => cs.as_slice().iter().copied(),
        }
    }

    fn satisfied(&self, updated: impl Fn(ChannelId) -> bool) -> bool {
        match self {
            Self::One(c) => updated(*c),
            Self::All(cs) => cs.iter().all(|c| updated(*c)),
        }
    }
}

impl From<ChannelId> for WaitSpec {
    fn from(chan: ChannelId) -> Self {
        Self::One(chan)
    }
}

impl From<Vec<ChannelId>> for WaitSpec {
    fn from(chans: Vec<ChannelId>) -> Self {
        Self::All(chans)
    }
}

/// Future returned by [`Cx::spawn`].
///
/// The hand-off happens on the first poll; the second poll resolves to the
/// child's return channel.
#[must_use = "spawn does nothing until awaited"]
pub struct Spawn<F> {
    cx: Cx,
    body: Option<F>,
    ret: Option<ChannelId>,
}

// `Spawn` never pin-projects its body; it is only moved out whole.
impl<F> Unpin for Spawn<F> {}

impl<F, Fut> Future for Spawn<F>
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Vec<Value>> + 'static,
{
    type Output = ChannelId;

    fn poll(self: Pin<&mut Self>, _task: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(ret) = this.ret {
            return Poll::Ready(ret);
        }

        let rc = this.cx.state();
        let parent = this.cx.pid;
        let (child, ret) = {
            let mut st = rc.borrow_mut();
            let parent_priority = st
                .processes
                .get(parent.arena_index())
                .expect("live process")
                .priority;
            // The child inherits the parent's slot; the parent steps to a
            // fresh one just after it.
            let stepped = st
                .priorities
                .insert_after(parent_priority)
                .expect("priority label span exhausted");
            st.processes
                .get_mut(parent.arena_index())
                .expect("live process")
                .priority = stepped;
            let ret = st.create_channel(Record::new());
            let child = st.create_process(ProcessState::Created, parent_priority, Some(ret));
            (child, ret)
        };
        let fut = (this.body.take().expect("spawn polled once"))(this.cx.for_process(child));
        {
            let mut st = rc.borrow_mut();
            st.install_continuation(child, Box::pin(fut));
            st.push_spawned(child);
            // Step aside: the parent re-queues itself and yields so the
            // child runs now.
            st.enqueue_ready(parent);
        }
        trace!(parent = %parent, child = %child, "spawned child, yielding to it");
        this.ret = Some(ret);
        Poll::Pending
    }
}

impl<F> core::fmt::Debug for Spawn<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Spawn")
            .field("parent", &self.cx.pid)
            .field("ret", &self.ret)
            .finish()
    }
}

/// Future returned by [`Cx::wait`].
#[must_use = "wait does nothing until awaited"]
#[derive(Debug)]
pub struct Wait {
    cx: Cx,
    specs: Vec<WaitSpec>,
    /// Every channel named by any spec, with its accumulated updated flag.
    tracked: Vec<(ChannelId, bool)>,
    begun: bool,
}

impl Future for Wait {
    type Output = Vec<bool>;

    fn poll(self: Pin<&mut Self>, _task: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.specs.is_empty() {
            return Poll::Ready(Vec::new());
        }

        let rc = this.cx.state();
        let mut st = rc.borrow_mut();
        let pid = this.cx.pid;

        if !this.begun {
            this.begun = true;
            for spec in &this.specs {
                for chan in spec.channels() {
                    if !this.tracked.iter().any(|(c, _)| *c == chan) {
                        this.tracked.push((chan, false));
                    }
                }
            }
            for (chan, _) in &this.tracked {
                st.sensitize(pid, *chan);
            }
            st.release_deferred(pid);
            st.processes
                .get_mut(pid.arena_index())
                .expect("live process")
                .state = ProcessState::Waiting;
            trace!(process = %pid, channels = this.tracked.len(), "waiting");
            return Poll::Pending;
        }

        // Being dropped from a trigger set is the update signal; fold it
        // into the accumulated flags.
        for (chan, updated) in &mut this.tracked {
            if !*updated && !st.is_sensitized(pid, *chan) {
                *updated = true;
            }
        }
        let updated =
            |chan: ChannelId| this.tracked.iter().any(|(c, done)| *c == chan && *done);
        let satisfied: Vec<bool> = this.specs.iter().map(|s| s.satisfied(updated)).collect();

        if satisfied.iter().any(|s| *s) {
            for (chan, updated) in &this.tracked {
                if !*updated {
                    st.desensitize(pid, *chan);
                }
            }
            trace!(process = %pid, "wait satisfied");
            Poll::Ready(satisfied)
        } else {
            // Woken, but no spec is complete yet: stay sensitized to the
            // still-pending channels and yield again.
            for (chan, updated) in &this.tracked {
                if !*updated {
                    st.sensitize(pid, *chan);
                }
            }
            st.release_deferred(pid);
            st.processes
                .get_mut(pid.arena_index())
                .expect("live process")
                .state = ProcessState::Waiting;
            Poll::Pending
        }
    }
}
