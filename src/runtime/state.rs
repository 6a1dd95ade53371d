//! Scheduler state.
//!
//! One `RuntimeState` owns everything the scheduler touches: the logical
//! clock, the process and channel arenas, the priority order, the run
//! stack (freshly spawned higher-priority children), the run queue (ready
//! processes by priority), the event queue (channels by earliest pending
//! update), and the active-process count that keeps the runtime alive.
//!
//! All cross-record operations live here so that the wake rules are stated
//! in one place:
//!
//! - an **instant write** wakes only sensitized processes of strictly
//!   lower priority than the writer (anyone at equal or higher priority
//!   already ran this instant and stays sensitized);
//! - a **delayed commit** opens a new instant and wakes every sensitized
//!   process unconditionally.

use crate::channel::ChannelRecord;
use crate::error::{Error, ErrorKind, Result};
use crate::priority::{Priority, PriorityList};
use crate::process::{Continuation, ProcessRecord, ProcessState};
use crate::tracing_compat::trace;
use crate::types::{ChannelId, Key, LogicalTime, ProcessId, Record, Value};
use crate::util::{Arena, MinQueue};

pub(crate) struct RuntimeState {
    /// The logical clock.
    pub now: LogicalTime,
    pub processes: Arena<ProcessRecord>,
    pub channels: Arena<ChannelRecord>,
    pub priorities: PriorityList,
    /// Freshly spawned children of the running process, LIFO; the top is
    /// always the next to run.
    pub run_stack: Vec<ProcessId>,
    /// Ready processes, keyed by priority.
    pub run_queue: MinQueue<ProcessId, Priority>,
    /// Channels with pending updates, keyed by earliest pending time.
    pub event_queue: MinQueue<ChannelId, LogicalTime>,
    /// Number of live processes counting toward liveness.
    pub active: usize,
    /// The process currently being resumed, if any.
    pub running: Option<ProcessId>,
    /// Set once a root process has been installed.
    pub started: bool,
}

impl RuntimeState {
    pub fn new(start: LogicalTime) -> Self {
        Self {
            now: start,
            processes: Arena::new(),
            channels: Arena::new(),
            priorities: PriorityList::new(),
            run_stack: Vec::new(),
            run_queue: MinQueue::new(),
            event_queue: MinQueue::new(),
            active: 0,
            running: None,
            started: false,
        }
    }

    // === Clock ===

    /// Advances the clock. Strictly monotone; `NEVER` is unreachable.
    pub fn set_time(&mut self, at: LogicalTime) -> Result<()> {
        if at.is_never() {
            return Err(Error::new(ErrorKind::Temporal).with_context("cannot advance to never"));
        }
        if at <= self.now {
            return Err(Error::new(ErrorKind::Temporal)
                .with_context(format!("time must advance strictly: {} -> {at}", self.now)));
        }
        trace!(from = %self.now, to = %at, "advance logical time");
        self.now = at;
        Ok(())
    }

    /// The earliest scheduled update time, or `NEVER`.
    pub fn next_event_time(&self) -> LogicalTime {
        self.event_queue
            .peek()
            .map_or(LogicalTime::NEVER, |(_, at)| *at)
    }

    // === Channels ===

    pub fn create_channel(&mut self, init: Record) -> ChannelId {
        let idx = self.channels.insert(ChannelRecord::new(init, self.now));
        ChannelId::from_arena(idx)
    }

    pub fn channel(&self, chan: ChannelId) -> &ChannelRecord {
        self.channels.get(chan.arena_index()).expect("live channel")
    }

    fn channel_mut(&mut self, chan: ChannelId) -> &mut ChannelRecord {
        self.channels
            .get_mut(chan.arena_index())
            .expect("live channel")
    }

    /// Instant assignment: make `key = value` visible now and wake
    /// sensitized processes of strictly lower priority than the writer.
    pub fn assign(&mut self, writer: ProcessId, chan: ChannelId, key: Key, value: Value) {
        let now = self.now;
        self.channel_mut(chan).write_now(key, value, now);
        self.wake_lower(writer, chan);
    }

    /// Instant deletion: remove `key` and its stamp, waking like a write.
    pub fn delete_field(&mut self, writer: ProcessId, chan: ChannelId, key: &Key) {
        self.channel_mut(chan).delete_now(key);
        self.wake_lower(writer, chan);
    }

    fn wake_lower(&mut self, writer: ProcessId, chan: ChannelId) {
        let writer_priority = self
            .processes
            .get(writer.arena_index())
            .expect("live writer")
            .priority;
        let sensitized: Vec<ProcessId> = self.channel(chan).triggers.iter().copied().collect();
        for q in sensitized {
            let q_priority = self
                .processes
                .get(q.arena_index())
                .expect("sensitized process is live")
                .priority;
            if self.priorities.precedes(writer_priority, q_priority) {
                self.channel_mut(chan).triggers.remove(&q);
                self.enqueue_ready(q);
            }
        }
    }

    /// Schedules `key = value` on `chan` at the strictly-future time `at`
    /// and keeps the event queue keyed by the channel's earliest update.
    pub fn schedule_update(
        &mut self,
        chan: ChannelId,
        at: LogicalTime,
        key: Key,
        value: Value,
    ) -> Result<()> {
        if at.is_never() || at <= self.now {
            return Err(Error::new(ErrorKind::Temporal).with_context(format!(
                "update must be strictly in the future: now {} vs {at}",
                self.now
            )));
        }
        let Some(rec) = self.channels.get_mut(chan.arena_index()) else {
            return Err(Error::new(ErrorKind::Usage).with_context("unknown channel"));
        };
        let moved = rec.store_pending(key, at, value);
        let earliest = rec.earliest;
        let queued = rec.queued;
        if queued {
            if moved {
                self.event_queue.reposition(&chan, earliest, |a, b| a < b);
            }
        } else {
            rec.queued = true;
            self.event_queue.push(chan, earliest, |a, b| a < b);
        }
        trace!(channel = %chan, at = %at, "schedule delayed update");
        Ok(())
    }

    /// Commits every channel whose earliest pending update is due now and
    /// wakes everything sensitized to them. Opens the instant.
    pub fn commit_due(&mut self) {
        loop {
            match self.event_queue.peek() {
                Some((_, &at)) if at == self.now => {}
                Some((chan, &at)) => {
                    assert!(
                        at > self.now,
                        "event queue holds a past update for {chan}: {at} < {}",
                        self.now
                    );
                    break;
                }
                None => break,
            }
            let (chan, _) = self
                .event_queue
                .pop(|a, b| a < b)
                .expect("peeked entry is poppable");
            let now = self.now;
            let woken = {
                let rec = self.channel_mut(chan);
                rec.queued = false;
                rec.commit(now)
            };
            trace!(channel = %chan, woken = woken.len(), "commit pending updates");
            for pid in woken {
                self.enqueue_ready(pid);
            }
            let earliest = self.channel(chan).earliest;
            if !earliest.is_never() {
                self.channel_mut(chan).queued = true;
                self.event_queue.push(chan, earliest, |a, b| a < b);
            }
        }
    }

    // === Sensitization ===

    pub fn sensitize(&mut self, pid: ProcessId, chan: ChannelId) {
        self.channel_mut(chan).triggers.insert(pid);
    }

    pub fn desensitize(&mut self, pid: ProcessId, chan: ChannelId) {
        self.channel_mut(chan).triggers.remove(&pid);
    }

    pub fn is_sensitized(&self, pid: ProcessId, chan: ChannelId) -> bool {
        self.channel(chan).triggers.contains(&pid)
    }

    // === Processes ===

    /// Inserts a process record; the continuation is installed separately.
    pub fn create_process(
        &mut self,
        state: ProcessState,
        priority: Priority,
        ret: Option<ChannelId>,
    ) -> ProcessId {
        let idx = self.processes.insert(ProcessRecord::new(
            ProcessId::from_arena(crate::util::ArenaIndex::new(0, 0)),
            state,
            priority,
            ret,
        ));
        let pid = ProcessId::from_arena(idx);
        self.processes.get_mut(idx).expect("just inserted").id = pid;
        self.active += 1;
        pid
    }

    pub fn install_continuation(&mut self, pid: ProcessId, continuation: Continuation) {
        let rec = self
            .processes
            .get_mut(pid.arena_index())
            .expect("live process");
        debug_assert!(rec.continuation.is_none(), "continuation installed twice");
        rec.continuation = Some(continuation);
    }

    /// Puts a process into the run queue unless it is already queued.
    pub fn enqueue_ready(&mut self, pid: ProcessId) {
        let Self {
            processes,
            priorities,
            run_queue,
            ..
        } = self;
        let rec = processes.get_mut(pid.arena_index()).expect("live process");
        if rec.queued {
            return;
        }
        rec.queued = true;
        rec.state = ProcessState::Ready;
        run_queue.push(pid, rec.priority, |a, b| priorities.precedes(*a, *b));
    }

    /// Puts a freshly spawned child on the run stack. The caller guarantees
    /// the child outranks everything queued.
    pub fn push_spawned(&mut self, pid: ProcessId) {
        let rec = self
            .processes
            .get_mut(pid.arena_index())
            .expect("live process");
        debug_assert!(!rec.queued, "spawned child cannot already be queued");
        rec.queued = true;
        rec.state = ProcessState::Ready;
        self.run_stack.push(pid);
    }

    /// Takes the highest-priority ready process: the run-stack top wins
    /// when it outranks the run-queue head.
    pub fn dequeue_next(&mut self) -> Option<ProcessId> {
        let Self {
            processes,
            priorities,
            run_queue,
            run_stack,
            ..
        } = self;
        let from_stack = match (run_stack.last(), run_queue.peek()) {
            (Some(&top), Some((_, &queued))) => {
                let stacked = processes
                    .get(top.arena_index())
                    .expect("stacked process is live")
                    .priority;
                priorities.precedes(stacked, queued)
            }
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        let pid = if from_stack {
            run_stack.pop().expect("checked non-empty")
        } else {
            run_queue
                .pop(|a, b| priorities.precedes(*a, *b))
                .expect("checked non-empty")
                .0
        };
        let rec = processes.get_mut(pid.arena_index()).expect("live process");
        debug_assert_eq!(rec.state, ProcessState::Ready, "only ready processes queue");
        rec.queued = false;
        rec.state = ProcessState::Running;
        Some(pid)
    }

    /// Launches every deferred child of `pid`, in creation order.
    pub fn release_deferred(&mut self, pid: ProcessId) {
        let children = {
            let rec = self
                .processes
                .get_mut(pid.arena_index())
                .expect("live process");
            std::mem::take(&mut rec.deferred)
        };
        for child in children {
            trace!(parent = %pid, child = %child, "release deferred child");
            self.enqueue_ready(child);
        }
    }

    /// Toggles a process's contribution to the active count.
    pub fn set_process_active(&mut self, pid: ProcessId, on: bool) {
        let rec = self
            .processes
            .get_mut(pid.arena_index())
            .expect("live process");
        if rec.active == on {
            return;
        }
        rec.active = on;
        if on {
            self.active += 1;
        } else {
            self.active -= 1;
        }
    }

    /// Terminates `pid`: post return values and the terminated flag to the
    /// return channel, release remaining deferred children, retire the
    /// record and its priority.
    pub fn finish(&mut self, pid: ProcessId, values: Vec<Value>) {
        trace!(process = %pid, returns = values.len(), "process terminated");
        let ret = self
            .processes
            .get(pid.arena_index())
            .expect("live process")
            .ret;
        if let Some(ret) = ret {
            for (i, value) in values.into_iter().enumerate() {
                self.assign(pid, ret, Key::Index(i as u64), value);
            }
            self.assign(pid, ret, Key::terminated(), Value::Bool(true));
        }
        self.release_deferred(pid);
        let rec = self
            .processes
            .remove(pid.arena_index())
            .expect("live process");
        if rec.active {
            self.active -= 1;
        }
        self.priorities.remove(rec.priority);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn t(ticks: u64) -> LogicalTime {
        LogicalTime::from_ticks(ticks)
    }

    /// A state with `n` processes in priority order (index 0 highest).
    fn state_with_processes(n: usize) -> (RuntimeState, Vec<ProcessId>) {
        let mut st = RuntimeState::new(LogicalTime::ZERO);
        let mut prio = st.priorities.new_base().unwrap();
        let mut pids = Vec::new();
        for _ in 0..n {
            let pid = st.create_process(ProcessState::Waiting, prio, None);
            pids.push(pid);
            prio = st.priorities.insert_after(prio).unwrap();
        }
        (st, pids)
    }

    #[test]
    fn set_time_is_strictly_monotone() {
        let mut st = RuntimeState::new(LogicalTime::ZERO);
        st.set_time(t(3)).unwrap();
        assert_eq!(st.now, t(3));
        assert_eq!(st.set_time(t(3)).unwrap_err().kind(), ErrorKind::Temporal);
        assert_eq!(st.set_time(t(1)).unwrap_err().kind(), ErrorKind::Temporal);
        assert_eq!(
            st.set_time(LogicalTime::NEVER).unwrap_err().kind(),
            ErrorKind::Temporal
        );
    }

    #[test]
    fn instant_write_wakes_only_lower_priority() {
        let (mut st, pids) = state_with_processes(3);
        let chan = st.create_channel(Record::new());
        // Everyone is sensitized; the middle process writes.
        for pid in &pids {
            st.sensitize(*pid, chan);
        }
        st.assign(pids[1], chan, "k".into(), Value::Int(1));

        // Higher-priority (and the writer itself, still sensitized) stay.
        assert!(st.is_sensitized(pids[0], chan));
        assert!(st.is_sensitized(pids[1], chan));
        // Strictly lower priority is woken and dequeued from triggers.
        assert!(!st.is_sensitized(pids[2], chan));
        assert!(st.run_queue.contains(&pids[2]));
    }

    #[test]
    fn equal_priority_is_not_woken_by_instant_write() {
        // A process that writes a channel it is itself sensitized to: the
        // comparator must not treat it as lower than itself.
        let (mut st, pids) = state_with_processes(1);
        let chan = st.create_channel(Record::new());
        st.sensitize(pids[0], chan);
        st.assign(pids[0], chan, "k".into(), Value::Int(1));
        assert!(st.is_sensitized(pids[0], chan));
        assert!(!st.run_queue.contains(&pids[0]));
    }

    #[test]
    fn commit_wakes_everyone_and_requeues_remainder() {
        let (mut st, pids) = state_with_processes(2);
        let chan = st.create_channel(Record::new());
        st.schedule_update(chan, t(2), "a".into(), Value::Int(1))
            .unwrap();
        st.schedule_update(chan, t(6), "b".into(), Value::Int(2))
            .unwrap();
        for pid in &pids {
            st.sensitize(*pid, chan);
        }

        st.set_time(t(2)).unwrap();
        st.commit_due();

        assert!(!st.is_sensitized(pids[0], chan));
        assert!(!st.is_sensitized(pids[1], chan));
        assert!(st.run_queue.contains(&pids[0]));
        assert!(st.run_queue.contains(&pids[1]));
        // The later update keeps the channel in the event queue.
        assert_eq!(st.next_event_time(), t(6));
        assert!(st.channel(chan).queued);
    }

    #[test]
    fn schedule_update_rejects_past_and_never() {
        let mut st = RuntimeState::new(t(5));
        let chan = st.create_channel(Record::new());
        for bad in [t(5), t(4), LogicalTime::NEVER] {
            let err = st
                .schedule_update(chan, bad, "k".into(), Value::Int(0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Temporal);
        }
        assert_eq!(st.next_event_time(), LogicalTime::NEVER);
    }

    #[test]
    fn reschedule_repositions_event_queue() {
        let mut st = RuntimeState::new(LogicalTime::ZERO);
        let chan = st.create_channel(Record::new());
        st.schedule_update(chan, t(5), "k".into(), Value::Text("A".into()))
            .unwrap();
        assert_eq!(st.next_event_time(), t(5));
        st.schedule_update(chan, t(3), "k".into(), Value::Text("B".into()))
            .unwrap();
        assert_eq!(st.next_event_time(), t(3));
        assert_eq!(st.event_queue.count(&chan), 1);

        st.set_time(t(3)).unwrap();
        st.commit_due();
        assert_eq!(
            st.channel(chan).get(&"k".into()),
            Some(&Value::Text("B".into()))
        );
        assert_eq!(st.next_event_time(), LogicalTime::NEVER);
        assert!(!st.channel(chan).queued);
    }

    #[test]
    fn dequeue_prefers_the_stack_only_when_it_outranks_the_queue() {
        let (mut st, pids) = state_with_processes(3);
        // Queue the highest priority process, stack the middle one.
        st.enqueue_ready(pids[0]);
        st.push_spawned(pids[1]);

        // The queued process outranks the stacked one.
        assert_eq!(st.dequeue_next(), Some(pids[0]));
        assert_eq!(st.dequeue_next(), Some(pids[1]));
        assert_eq!(st.dequeue_next(), None);
    }

    #[test]
    fn enqueue_is_idempotent_while_queued() {
        let (mut st, pids) = state_with_processes(1);
        st.enqueue_ready(pids[0]);
        st.enqueue_ready(pids[0]);
        assert_eq!(st.run_queue.count(&pids[0]), 1);
    }

    #[test]
    fn passive_processes_do_not_count() {
        let (mut st, pids) = state_with_processes(2);
        assert_eq!(st.active, 2);
        st.set_process_active(pids[0], false);
        assert_eq!(st.active, 1);
        // Idempotent.
        st.set_process_active(pids[0], false);
        assert_eq!(st.active, 1);
        st.set_process_active(pids[0], true);
        assert_eq!(st.active, 2);
    }

    #[test]
    fn finish_posts_returns_and_retires_the_process() {
        let (mut st, pids) = state_with_processes(1);
        let ret = st.create_channel(Record::new());
        st.processes
            .get_mut(pids[0].arena_index())
            .unwrap()
            .ret = Some(ret);

        st.finish(pids[0], vec![Value::Int(7), Value::Bool(true)]);

        let rec = st.channel(ret);
        assert_eq!(rec.get(&Key::Index(0)), Some(&Value::Int(7)));
        assert_eq!(rec.get(&Key::Index(1)), Some(&Value::Bool(true)));
        assert_eq!(rec.get(&Key::terminated()), Some(&Value::Bool(true)));
        assert_eq!(st.active, 0);
        assert!(!st.processes.contains(pids[0].arena_index()));
        assert!(st.priorities.is_empty());
    }

    #[test]
    fn release_deferred_enqueues_in_creation_order() {
        let (mut st, pids) = state_with_processes(1);
        let parent = pids[0];
        let parent_prio = st
            .processes
            .get(parent.arena_index())
            .unwrap()
            .priority;
        let c1_prio = st.priorities.insert_after(parent_prio).unwrap();
        let c2_prio = st.priorities.insert_after(parent_prio).unwrap();
        let c1 = st.create_process(ProcessState::Created, c1_prio, None);
        let c2 = st.create_process(ProcessState::Created, c2_prio, None);
        st.processes
            .get_mut(parent.arena_index())
            .unwrap()
            .deferred
            .extend([c1, c2]);

        st.release_deferred(parent);
        assert!(st.run_queue.contains(&c1));
        assert!(st.run_queue.contains(&c2));
        // The later defer sits closer to the parent, so it runs first.
        assert_eq!(st.dequeue_next(), Some(c2));
        assert_eq!(st.dequeue_next(), Some(c1));
        assert!(st
            .processes
            .get(parent.arena_index())
            .unwrap()
            .deferred
            .is_empty());
    }

    #[test]
    fn sensitize_desensitize_round_trip() {
        let (mut st, pids) = state_with_processes(1);
        let chan = st.create_channel(record! { "k" => Value::Int(0) });
        let before = st.channel(chan).triggers.clone();
        st.sensitize(pids[0], chan);
        st.sensitize(pids[0], chan);
        st.desensitize(pids[0], chan);
        assert_eq!(st.channel(chan).triggers, before);
    }
}
