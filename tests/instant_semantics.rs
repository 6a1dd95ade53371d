//! Instant-level semantics: boundary behaviors, idempotence, and the
//! scheduler invariants checked between driver steps.

mod common;

use common::init_test_logging;
use lockstep::cx::Cx;
use lockstep::record;
use lockstep::runtime::Runtime;
use lockstep::types::{Duration, LogicalTime, ProcessId, Record, Value};
use lockstep::{ErrorKind, ResultExt};

fn t(ticks: u64) -> LogicalTime {
    LogicalTime::from_ticks(ticks)
}

#[test]
fn empty_wait_returns_in_place() {
    init_test_logging();
    let rt = Runtime::new();
    let (end, returns) = rt
        .start(|cx: Cx| async move {
            let before = cx.now();
            let flags = cx.wait([]).await;
            assert!(flags.is_empty());
            assert_eq!(cx.now(), before);
            vec![Value::Bool(true)]
        })
        .unwrap();
    assert_eq!(end, t(0));
    assert_eq!(returns, vec![Value::Bool(true)]);
}

#[test]
fn immediate_return_start_transitions_active_one_to_zero() {
    init_test_logging();
    let rt = Runtime::new();
    let ret = rt
        .set_start(|cx: Cx| async move {
            assert_eq!(cx.num_active(), 1);
            vec![Value::Int(3), Value::Int(4)]
        })
        .unwrap();
    assert_eq!(rt.num_active(), 1);
    rt.run_instant();
    assert_eq!(rt.num_active(), 0);
    assert_eq!(rt.now(), t(0));
    assert!(rt.terminated(ret));
    assert_eq!(rt.returns(ret), vec![Value::Int(3), Value::Int(4)]);
}

#[test]
fn repeated_after_with_same_update_is_idempotent() {
    init_test_logging();
    let rt = Runtime::new();
    let chan = rt.channel(Record::new());
    rt.set_start(move |cx: Cx| async move {
        cx.after(Duration::from_ticks(4), chan, "k".into(), Value::Int(1))
            .unwrap();
        cx.after(Duration::from_ticks(4), chan, "k".into(), Value::Int(1))
            .unwrap();
        cx.wait_one(chan).await;
        Vec::new()
    })
    .unwrap();
    rt.run_instant();

    assert_eq!(rt.next_event_time(), t(4));
    assert!(rt.check_invariants().is_empty());
    rt.run().unwrap();
    assert_eq!(rt.get(chan, &"k".into()), Some(Value::Int(1)));
    assert_eq!(rt.last_updated(chan, Some(&"k".into())), Some(t(4)));
}

#[test]
fn sensitization_is_visible_and_cleared_on_wake() {
    init_test_logging();
    let rt = Runtime::new();
    let chan = rt.channel(Record::new());
    // The root process occupies the first arena slot.
    let root = ProcessId::new_for_test(0, 0);
    rt.set_start(move |cx: Cx| async move {
        assert!(!cx.sensitized(chan));
        cx.wait_one(chan).await;
        assert!(!cx.sensitized(chan));
        Vec::new()
    })
    .unwrap();
    rt.run_instant();

    assert!(rt.is_sensitized(chan, root));
    rt.schedule_update(chan, t(2), "k".into(), Value::Int(1))
        .unwrap();
    rt.set_time(t(2)).unwrap();
    rt.run_instant();
    assert!(!rt.is_sensitized(chan, root));
    assert_eq!(rt.num_active(), 0);
}

#[test]
fn driver_rejects_non_monotone_time() {
    init_test_logging();
    let rt = Runtime::starting_at(t(10));
    assert_eq!(rt.set_time(t(10)).unwrap_err().kind(), ErrorKind::Temporal);
    assert_eq!(rt.set_time(t(9)).unwrap_err().kind(), ErrorKind::Temporal);
    assert_eq!(
        rt.set_time(LogicalTime::NEVER).unwrap_err().kind(),
        ErrorKind::Temporal
    );
    rt.set_time(t(11)).unwrap();
    assert_eq!(rt.now(), t(11));
}

#[test]
fn driver_rejects_updates_not_in_the_future() {
    init_test_logging();
    let rt = Runtime::starting_at(t(5));
    let chan = rt.channel(Record::new());
    for bad in [t(0), t(5), LogicalTime::NEVER] {
        let err = rt
            .schedule_update(chan, bad, "k".into(), Value::Int(0))
            .context("injecting an external event")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Temporal);
    }
    assert_eq!(rt.next_event_time(), LogicalTime::NEVER);
}

#[test]
fn invariants_hold_after_every_driver_step() {
    init_test_logging();
    let rt = Runtime::new();
    let a = rt.channel(record! { "n" => Value::Int(0) });
    let b = rt.channel(Record::new());
    rt.set_start(move |cx: Cx| async move {
        cx.after(Duration::from_ticks(1), a, "n".into(), Value::Int(1))
            .unwrap();
        cx.after(Duration::from_ticks(3), b, "m".into(), Value::Int(2))
            .unwrap();
        cx.spawn(move |c| async move {
            c.wait_one(a).await;
            c.set(a, "echo".into(), Value::Int(int_of(&c, a)));
            Vec::new()
        })
        .await;
        cx.wait_one(b).await;
        vec![Value::Int(int_of(&cx, a))]
    })
    .unwrap();
    assert!(rt.check_invariants().is_empty());

    rt.run_instant();
    assert!(rt.check_invariants().is_empty());

    while rt.num_active() > 0 && !rt.next_event_time().is_never() {
        rt.set_time(rt.next_event_time()).unwrap();
        rt.run_instant();
        let violations = rt.check_invariants();
        assert!(violations.is_empty(), "violations: {violations:?}");
    }
    assert_eq!(rt.now(), t(3));
    assert_eq!(rt.num_active(), 0);
}

fn int_of(cx: &Cx, chan: lockstep::ChannelId) -> i64 {
    cx.get(chan, &"n".into())
        .and_then(|v| v.as_int())
        .unwrap_or(0)
}

#[test]
fn instant_delete_clears_field_and_stamp() {
    init_test_logging();
    let rt = Runtime::new();
    let chan = rt.channel(record! { "k" => Value::Int(1) });
    rt.start(move |cx: Cx| async move {
        assert_eq!(cx.last_updated(chan, Some(&"k".into())), Some(t(0)));
        cx.delete(chan, &"k".into());
        assert_eq!(cx.get(chan, &"k".into()), None);
        assert_eq!(cx.last_updated(chan, Some(&"k".into())), None);
        Vec::new()
    })
    .unwrap();
}

/// Waking is whole-channel: an update to one field wakes a process
/// regardless of which field it cares about.
#[test]
fn wake_is_whole_channel_not_per_key() {
    init_test_logging();
    let rt = Runtime::new();
    let (end, returns) = rt
        .start(|cx: Cx| async move {
            let chan = cx.channel(record! { "x" => Value::Int(0), "y" => Value::Int(0) });
            cx.after(Duration::from_ticks(2), chan, "y".into(), Value::Int(9))
                .unwrap();
            // Waits on the channel, though the pending update touches a
            // different field.
            cx.wait_one(chan).await;
            vec![
                cx.get(chan, &"x".into()).unwrap(),
                cx.get(chan, &"y".into()).unwrap(),
            ]
        })
        .unwrap();
    assert_eq!(end, t(2));
    assert_eq!(returns, vec![Value::Int(0), Value::Int(9)]);
}
