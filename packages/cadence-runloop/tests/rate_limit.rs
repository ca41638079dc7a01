use cadence_runloop::{ManualClock, Method, Scheduler, Target, TargetRef, Task, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn setup() -> (Rc<ManualClock>, Scheduler) {
    let clock = Rc::new(ManualClock::new());
    let scheduler = Scheduler::new(clock.clone());
    (clock, scheduler)
}

/// A method that records the arguments of every call.
fn recorder() -> (Method, Rc<RefCell<Vec<Vec<Value>>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let method = {
        let calls = calls.clone();
        Method::new(move |_, args| {
            calls.borrow_mut().push(args.to_vec());
            Ok(())
        })
    };
    (method, calls)
}

struct Search;
impl Target for Search {}

#[test]
fn test_throttle_immediate_runs_once_per_window() {
    let (clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    let first = scheduler.throttle(Task::new(&run_it).arg(1), 150, true).unwrap();
    assert_eq!(calls.borrow().len(), 1, "first call runs synchronously");

    clock.advance(50);
    let second = scheduler.throttle(Task::new(&run_it).arg(2), 150, true).unwrap();
    clock.advance(50);
    let third = scheduler.throttle(Task::new(&run_it).arg(3), 150, true).unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(*calls.borrow(), vec![vec![Value::from(1)]]);

    // Window closes; the suppressed calls are not replayed.
    clock.advance(50);
    scheduler.tick().unwrap();
    assert_eq!(calls.borrow().len(), 1);

    // A new window starts with the next call.
    scheduler.throttle(Task::new(&run_it).arg(4), 150, true).unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_throttle_trailing_uses_latest_args() {
    let (clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    scheduler.throttle(Task::new(&run_it).arg("a"), 100, false).unwrap();
    scheduler.throttle(Task::new(&run_it).arg("b"), 100, false).unwrap();
    assert!(calls.borrow().is_empty());

    clock.advance(100);
    scheduler.tick().unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from("b")]]);
}

#[test]
fn test_throttle_keys_by_target() {
    let (_clock, scheduler) = setup();
    let (run_it, calls) = recorder();
    let a: TargetRef = Rc::new(Search);
    let b: TargetRef = Rc::new(Search);

    scheduler.throttle(Task::on(a.clone(), &run_it), 150, true).unwrap();
    scheduler.throttle(Task::on(b, &run_it), 150, true).unwrap();
    scheduler.throttle(Task::on(a, &run_it), 150, true).unwrap();

    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_cancel_throttle() {
    let (clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    let handle = scheduler.throttle(Task::new(&run_it), 1, false).unwrap();
    assert!(scheduler.cancel(handle));

    clock.advance(10);
    scheduler.tick().unwrap();
    assert!(calls.borrow().is_empty());

    // Cancelling also reopened the window.
    scheduler.throttle(Task::new(&run_it), 0, true).unwrap();
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn test_cancel_immediate_throttle_reopens_window() {
    let (_clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    let window = scheduler.throttle(Task::new(&run_it).arg(1), 150, true).unwrap();
    assert!(scheduler.cancel(window));
    assert!(!scheduler.cancel(window));
    assert!(!scheduler.has_scheduled_timers());

    scheduler.throttle(Task::new(&run_it).arg(2), 150, true).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from(1)], vec![Value::from(2)]]);
}

#[test]
fn test_throttle_distinct_closures_do_not_share_a_window() {
    let (_clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    // Each task is dropped once it runs; only its window remains.
    for label in ["a", "b", "c"] {
        let l = log.clone();
        scheduler
            .throttle(Task::from_fn(move || l.borrow_mut().push(label)), 100, true)
            .unwrap();
    }

    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn test_debounce_fires_after_quiet_period() {
    let (clock, scheduler) = setup();
    let (fetch, calls) = recorder();

    scheduler.debounce(Task::new(&fetch).arg("t"), 250, false).unwrap();
    clock.advance(200);
    scheduler.tick().unwrap();
    scheduler.debounce(Task::new(&fetch).arg("te"), 250, false).unwrap();
    clock.advance(200);
    scheduler.tick().unwrap();
    scheduler.debounce(Task::new(&fetch).arg("tes"), 250, false).unwrap();
    assert!(calls.borrow().is_empty());

    clock.advance(249);
    scheduler.tick().unwrap();
    assert!(calls.borrow().is_empty());

    clock.advance(1);
    scheduler.tick().unwrap();
    assert_eq!(*calls.borrow(), vec![vec![Value::from("tes")]]);
}

#[test]
fn test_cancel_debounce() {
    let (clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    let handle = scheduler.debounce(Task::new(&run_it), 1, false).unwrap();
    assert!(scheduler.cancel(handle));
    clock.advance(5);
    scheduler.tick().unwrap();
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_debounce_immediate() {
    let (clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 1, "runs immediately");

    clock.advance(50);
    scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 1, "suppressed inside the cooldown");

    // The second call restarted the cooldown: 100ms after the first call is
    // still inside it.
    clock.advance(60);
    scheduler.tick().unwrap();
    scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 1);

    // Cooldown lapses with no further execution.
    clock.advance(100);
    scheduler.tick().unwrap();
    assert_eq!(calls.borrow().len(), 1);

    // A fresh cycle runs immediately again.
    scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_cancel_debounce_immediate_clears_cooldown() {
    let (_clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    let handle = scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 1);

    assert!(scheduler.cancel(handle));
    assert!(!scheduler.has_scheduled_timers());

    // No cooldown left to block the next call.
    scheduler.debounce(Task::new(&run_it), 100, true).unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_immediate_debounce_distinct_closures_each_run() {
    let (_clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    for label in ["a", "b", "c"] {
        let l = log.clone();
        scheduler
            .debounce(Task::from_fn(move || l.borrow_mut().push(label)), 100, true)
            .unwrap();
    }

    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn test_immediate_debounce_distinct_targets_each_run() {
    let (_clock, scheduler) = setup();
    let (run_it, calls) = recorder();

    for _ in 0..3 {
        let target: TargetRef = Rc::new(Search);
        scheduler.debounce(Task::on(target, &run_it), 100, true).unwrap();
    }

    assert_eq!(calls.borrow().len(), 3);
}

#[test]
fn test_immediate_calls_join_the_current_loop() {
    let (_clock, scheduler) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    let sch = scheduler.clone();
    let l = log.clone();
    let method = Method::from_fn(move || {
        let inner = l.clone();
        sch.schedule("render", Task::from_fn(move || inner.borrow_mut().push("render")))
            .unwrap();
        l.borrow_mut().push("throttled");
    });

    scheduler
        .run(|| {
            scheduler.throttle(Task::new(&method), 100, true).unwrap();
            assert_eq!(*log.borrow(), vec!["throttled"]);
        })
        .unwrap();

    assert_eq!(*log.borrow(), vec!["throttled", "render"]);
}
