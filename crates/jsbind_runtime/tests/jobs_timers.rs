mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use common::Harness;
use jsbind_runtime::{Context, ErrorKind, PumpStats, Value};
use parking_lot::Mutex;

fn recorder(ctx: &mut Context, log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Value {
    let log = log.clone();
    ctx.new_function(tag, move |_ctx, _this, _args| {
        log.borrow_mut().push(tag);
        Value::UNDEFINED
    })
}

#[test]
fn jobs_run_in_fifo_order() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let seen = seen.clone();
        ctx.enqueue_job(move |_ctx| {
            seen.lock().push(i);
            Ok(())
        })
        .unwrap();
    }
    let stats = ctx.execute_pending_jobs();
    assert_eq!(stats.jobs_run, 3);
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    assert_eq!(ctx.execute_pending_jobs(), PumpStats::default());
}

#[test]
fn jobs_queued_by_jobs_wait_for_next_pump() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let outer = seen.clone();
    ctx.enqueue_job(move |ctx| {
        outer.lock().push("outer");
        let inner = outer.clone();
        ctx.enqueue_job(move |_ctx| {
            inner.lock().push("inner");
            Ok(())
        });
        Ok(())
    });
    assert_eq!(ctx.execute_pending_jobs().jobs_run, 1);
    assert_eq!(*seen.lock(), vec!["outer"]);
    assert_eq!(ctx.execute_pending_jobs().jobs_run, 1);
    assert_eq!(*seen.lock(), vec!["outer", "inner"]);
}

#[test]
fn cancelled_jobs_do_not_run() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let sender = ctx.job_sender();
    let keep = sender.enqueue(|_ctx| Ok(())).unwrap();
    let drop_me = sender.enqueue(|_ctx| panic!("cancelled job ran")).unwrap();
    assert_ne!(keep, drop_me);
    assert!(sender.cancel(drop_me));
    assert!(!sender.cancel(drop_me));
    assert_eq!(sender.pending(), 1);
    assert_eq!(ctx.execute_pending_jobs().jobs_run, 1);
}

#[test]
fn failing_job_is_counted_and_cleared() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    ctx.enqueue_job(|ctx| Err(ctx.throw_error(ErrorKind::Error, "job failed")));
    ctx.enqueue_job(|_ctx| Ok(()));
    let stats = ctx.execute_pending_jobs();
    assert_eq!(stats.jobs_run, 2);
    assert_eq!(stats.jobs_failed, 1);
    assert!(!ctx.has_exception());
}

#[test]
fn jobs_can_be_sent_from_other_threads() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let sender = ctx.job_sender();
    let worker = std::thread::spawn(move || {
        sender
            .enqueue(|ctx| {
                let global = ctx.global_object();
                ctx.set_property_str(global, "fromWorker", Value::TRUE)
            })
            .is_some()
    });
    assert!(worker.join().unwrap());
    assert_eq!(ctx.execute_pending_jobs().jobs_run, 1);
    let global = ctx.global_object();
    assert_eq!(ctx.get_property_str(global, "fromWorker").unwrap(), Value::TRUE);
}

#[test]
fn sender_closes_with_its_context() {
    let mut h = Harness::new();
    let sender = h.ctx().job_sender();
    sender.enqueue(|_ctx| Ok(())).unwrap();
    h.registry.free_context(h.ctx).unwrap();
    assert!(sender.is_closed());
    assert_eq!(sender.pending(), 0);
    assert!(sender.enqueue(|_ctx| Ok(())).is_none());
}

#[test]
fn timers_fire_in_due_order() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let a = recorder(ctx, &log, "a");
    let b = recorder(ctx, &log, "b");
    let c = recorder(ctx, &log, "c");
    ctx.set_timeout(a, 20.0);
    ctx.set_timeout(b, 10.0);
    ctx.set_timeout(c, 10.0);
    ctx.free_values(&[a, b, c]);
    assert_eq!(ctx.pending_timers(), 3);

    assert_eq!(ctx.tick(5).timers_fired, 0);
    let stats = ctx.tick(20);
    assert_eq!(stats.timers_fired, 3);
    assert_eq!(*log.borrow(), vec!["b", "c", "a"]);
    assert_eq!(ctx.pending_timers(), 0);
}

#[test]
fn intervals_reschedule_until_cleared() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let tick = recorder(ctx, &log, "tick");
    let id = ctx.set_interval(tick, 10.0);
    ctx.free_value(tick);

    assert_eq!(ctx.tick(10).timers_fired, 1);
    assert_eq!(ctx.tick(15).timers_fired, 0);
    // A long stall fires once, not once per missed period.
    assert_eq!(ctx.tick(100).timers_fired, 1);
    assert_eq!(ctx.tick(101).timers_fired, 1);
    assert_eq!(log.borrow().len(), 3);

    assert!(ctx.clear_timer(id));
    assert!(!ctx.clear_timer(id));
    assert_eq!(ctx.tick(1_000).timers_fired, 0);
}

#[test]
fn timer_cleared_by_earlier_callback_is_skipped() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let victim = recorder(ctx, &log, "victim");
    let victim_id = Rc::new(RefCell::new(0u32));
    let target = victim_id.clone();
    let killer = ctx.new_function("killer", move |ctx, _this, _args| {
        ctx.clear_timer(*target.borrow());
        Value::UNDEFINED
    });
    ctx.set_timeout(killer, 0.0);
    *victim_id.borrow_mut() = ctx.set_timeout(victim, 0.0);
    ctx.free_values(&[killer, victim]);

    let stats = ctx.tick(0);
    assert_eq!(stats.timers_fired, 1);
    assert!(log.borrow().is_empty());
}

#[test]
fn timer_errors_are_counted() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let bad = ctx.new_function("bad", |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::Error, "timer failed");
        Value::EXCEPTION
    });
    ctx.set_timeout(bad, 0.0);
    ctx.free_value(bad);
    let stats = ctx.tick(0);
    assert_eq!(stats.timers_fired, 1);
    assert_eq!(stats.timers_failed, 1);
    assert!(!ctx.has_exception());
}

#[test]
fn tick_drains_jobs_before_timers() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let timer = recorder(ctx, &log, "timer");
    ctx.set_timeout(timer, 0.0);
    ctx.free_value(timer);
    ctx.enqueue_job(|ctx| {
        let global = ctx.global_object();
        ctx.set_property_str(global, "jobRan", Value::TRUE)
    });
    let stats = ctx.tick(0);
    assert_eq!(
        stats,
        PumpStats {
            jobs_run: 1,
            jobs_failed: 0,
            timers_fired: 1,
            timers_failed: 0,
        }
    );
}

#[test]
fn tick_now_reads_the_runtime_clock() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let cb = recorder(ctx, &log, "cb");
    ctx.set_timeout(cb, 50.0);
    ctx.free_value(cb);
    assert_eq!(h.ctx().tick_now().timers_fired, 0);
    h.clock.advance(50);
    assert_eq!(h.ctx().tick_now().timers_fired, 1);
}

#[test]
fn script_timer_globals() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let global = ctx.global_object();
    let set_timeout = ctx.get_property_str(global, "setTimeout").unwrap();
    let clear_timeout = ctx.get_property_str(global, "clearTimeout").unwrap();
    let kept = recorder(ctx, &log, "kept");
    let dropped = recorder(ctx, &log, "dropped");

    let r = ctx
        .call(set_timeout, global, &[kept, Value::from_i32(5)])
        .unwrap();
    assert!(r.as_number().is_some());
    let id = ctx
        .call(set_timeout, global, &[dropped, Value::from_i32(5)])
        .unwrap();
    let cleared = ctx.call(clear_timeout, global, &[id]).unwrap();
    assert!(cleared.is_undefined());

    assert!(ctx.call(set_timeout, global, &[Value::from_i32(1)]).is_err());
    assert_eq!(ctx.take_js_error().unwrap().name, "TypeError");

    assert_eq!(ctx.tick(5).timers_fired, 1);
    assert_eq!(*log.borrow(), vec!["kept"]);
    ctx.free_values(&[set_timeout, clear_timeout, kept, dropped]);
}

#[test]
fn context_teardown_drops_pending_timers() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let cb = recorder(ctx, &log, "late");
    ctx.set_interval(cb, 1.0);
    ctx.free_value(cb);
    h.registry.free_context(h.ctx).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn wrapped_timer_ids_skip_live_timers() {
    let mut h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = h.ctx();
    let first = recorder(ctx, &log, "first");
    let last = recorder(ctx, &log, "last");
    let wrapped = recorder(ctx, &log, "wrapped");

    assert_eq!(ctx.set_timeout(first, 50.0), 1);
    ctx.set_next_timer_id(u32::MAX);
    assert_eq!(ctx.set_timeout(last, 10.0), u32::MAX);
    assert_eq!(ctx.set_timeout(wrapped, 20.0), 2);
    assert_eq!(ctx.pending_timers(), 3);
    assert_eq!(ctx.ref_count_of(first), Some(2));

    assert_eq!(ctx.tick(50).timers_fired, 3);
    assert_eq!(*log.borrow(), vec!["last", "wrapped", "first"]);
    assert_eq!(ctx.ref_count_of(first), Some(1));
    ctx.free_values(&[first, last, wrapped]);
}
