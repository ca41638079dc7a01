use crate::binder::{self, Bound};
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{ConfigError, Result, RunLoopError};
use crate::run_loop::{LoopState, RunLoop};
use crate::task::{Invocation, InvocationKey, Task};
use crate::timer::{TimerAction, TimerId, TimerOwner, TimerRegistry};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Returned by `later`, `next`, `throttle` and `debounce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(TimerId);

/// Returned by `schedule`, `schedule_once` and `once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    loop_id: u64,
    item: u64,
}

/// Anything `cancel` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Timer(TimerHandle),
    Queued(QueueHandle),
}

impl From<TimerHandle> for Handle {
    fn from(h: TimerHandle) -> Self {
        Handle::Timer(h)
    }
}

impl From<QueueHandle> for Handle {
    fn from(h: QueueHandle) -> Self {
        Handle::Queued(h)
    }
}

#[derive(Default)]
struct State {
    // Suspended loops below, the current loop on top.
    stack: Vec<RunLoop>,
    timers: TimerRegistry,
    debounced: FxHashMap<InvocationKey, TimerId>,
    throttled: FxHashMap<InvocationKey, TimerId>,
    next_loop: u64,
    next_item: u64,
}

impl State {
    fn open(&mut self, config: &SchedulerConfig, autorun: bool) -> u64 {
        self.next_loop += 1;
        let mut run_loop = RunLoop::new(self.next_loop, config, autorun);
        run_loop.start();
        self.stack.push(run_loop);
        self.next_loop
    }

    /// The current loop, opening an autorun loop if there is none.
    fn current_or_autorun(&mut self, config: &SchedulerConfig) -> &mut RunLoop {
        if self.stack.is_empty() {
            let id = self.open(config, true);
            tracing::debug!("Autorun loop {} opened", id);
        }
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    fn release(&mut self, owner: &TimerOwner, id: TimerId) {
        let (map, key) = match owner {
            TimerOwner::Debounce(key) => (&mut self.debounced, key),
            TimerOwner::Throttle(key) => (&mut self.throttled, key),
        };
        // Only forget the key if it still points at this timer.
        if map.get(key) == Some(&id) {
            map.remove(key);
        }
    }
}

struct Inner {
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
    state: RefCell<State>,
}

/// A cooperative, single-threaded run-loop scheduler.
///
/// `Scheduler` is a cheap handle: clone it into invocations that need to
/// schedule more work. No internal borrow is held while user code runs, so
/// invocations can freely call back into the scheduler.
///
/// ```
/// use cadence_runloop::{ManualClock, Scheduler, Task};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let scheduler = Scheduler::new(Rc::new(ManualClock::new()));
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// scheduler.run(|| {
///     let l = log.clone();
///     scheduler.schedule("render", Task::from_fn(move || l.borrow_mut().push("render"))).unwrap();
///     let l = log.clone();
///     scheduler.schedule("sync", Task::from_fn(move || l.borrow_mut().push("sync"))).unwrap();
/// }).unwrap();
///
/// assert_eq!(*log.borrow(), vec!["sync", "render"]);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

#[derive(Clone, Debug)]
pub(crate) struct WeakScheduler(Weak<Inner>);

impl WeakScheduler {
    pub(crate) fn upgrade(&self) -> Option<Scheduler> {
        self.0.upgrade().map(|inner| Scheduler { inner })
    }
}

impl Scheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::build(SchedulerConfig::default(), clock)
    }

    pub fn with_config(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: SchedulerConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                clock,
                state: RefCell::new(State::default()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakScheduler {
        WeakScheduler(Rc::downgrade(&self.inner))
    }

    /// Queue names in drain order.
    pub fn queues(&self) -> &[String] {
        &self.inner.config.queues
    }

    pub fn now(&self) -> u64 {
        self.inner.clock.now()
    }

    pub fn has_current_loop(&self) -> bool {
        !self.inner.state.borrow().stack.is_empty()
    }

    /// Depth of the loop stack: 0 outside any loop, 2 inside a nested `run`.
    pub fn loop_depth(&self) -> usize {
        self.inner.state.borrow().stack.len()
    }

    pub fn current_loop_id(&self) -> Option<u64> {
        self.inner.state.borrow().stack.last().map(RunLoop::id)
    }

    pub fn has_scheduled_timers(&self) -> bool {
        self.inner.state.borrow().timers.has_pending()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.inner.state.borrow().timers.next_deadline()
    }

    /// Opens a new run loop and makes it current. A loop that was current
    /// is suspended until the new one ends.
    pub fn begin(&self) {
        let mut state = self.inner.state.borrow_mut();
        let id = state.open(&self.inner.config, false);
        tracing::debug!("Run loop {} begins (depth {})", id, state.stack.len());
    }

    /// Flushes the current loop and makes the suspended one (if any)
    /// current again.
    ///
    /// If an invocation fails, the loop is still torn down; the rest of its
    /// queued work is dropped and the error is returned.
    pub fn end(&self) -> Result<()> {
        let depth = {
            let mut state = self.inner.state.borrow_mut();
            let depth = state.stack.len().checked_sub(1).ok_or(RunLoopError::ReentrantEnd)?;
            let current = &mut state.stack[depth];
            if current.state() != LoopState::Running {
                return Err(RunLoopError::ReentrantEnd);
            }
            current.start_flush();
            depth
        };

        let result = self.flush(depth);

        let mut state = self.inner.state.borrow_mut();
        if state.stack.len() > depth + 1 {
            tracing::warn!(
                "{} nested run loop(s) were still open when their parent ended; discarding",
                state.stack.len() - depth - 1
            );
            state.stack.truncate(depth + 1);
        }
        if let Some(mut run_loop) = state.stack.pop() {
            run_loop.finish();
            tracing::debug!("Run loop {} ended", run_loop.id());
        }
        result
    }

    fn flush(&self, depth: usize) -> Result<()> {
        loop {
            let next = {
                let mut state = self.inner.state.borrow_mut();
                state.stack.get_mut(depth).and_then(|run_loop| {
                    let item = run_loop.next_item()?;
                    tracing::trace!(
                        "Loop {} running item {} from '{}'",
                        run_loop.id(),
                        item.id,
                        run_loop.current_queue().unwrap_or_default()
                    );
                    Some(item)
                })
            };

            let Some(item) = next else {
                return Ok(());
            };

            if let Err(err) = item.invocation.invoke() {
                tracing::warn!("Invocation failed, dropping the rest of the flush: {}", err);
                return Err(err);
            }
        }
    }

    /// `begin(); f(); end()`, returning `f`'s result.
    pub fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        self.begin();
        let value = f();
        self.end()?;
        Ok(value)
    }

    /// The `run(target, method, ...args)` form.
    pub fn run_task(&self, task: Task) -> Result<()> {
        let invocation = task.resolve()?;
        self.run_invocation(invocation)
    }

    /// Runs `f` inside the current loop, or inside a new one if none is
    /// current.
    pub fn join<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        if self.has_current_loop() {
            Ok(f())
        } else {
            self.run(f)
        }
    }

    pub fn join_task(&self, task: Task) -> Result<()> {
        let invocation = task.resolve()?;
        self.join_invocation(invocation)
    }

    fn run_invocation(&self, invocation: Invocation) -> Result<()> {
        self.begin();
        let outcome = invocation.invoke();
        let ended = self.end();
        outcome.and(ended)
    }

    pub(crate) fn join_invocation(&self, invocation: Invocation) -> Result<()> {
        if self.has_current_loop() {
            invocation.invoke()
        } else {
            self.run_invocation(invocation)
        }
    }

    pub fn schedule(&self, queue: &str, task: Task) -> Result<QueueHandle> {
        self.enqueue(queue, task, false)
    }

    /// Like `schedule`, but while an entry for the same (queue, target,
    /// method) is waiting, further calls only replace its arguments.
    pub fn schedule_once(&self, queue: &str, task: Task) -> Result<QueueHandle> {
        self.enqueue(queue, task, true)
    }

    /// `schedule_once` on the default queue (`actions` unless configured
    /// otherwise).
    pub fn once(&self, task: Task) -> Result<QueueHandle> {
        self.schedule_once(&self.inner.config.default_queue, task)
    }

    fn enqueue(&self, queue: &str, task: Task, once: bool) -> Result<QueueHandle> {
        let idx = self
            .inner
            .config
            .queues
            .iter()
            .position(|q| q == queue)
            .ok_or_else(|| RunLoopError::InvalidQueue {
                name: queue.to_string(),
            })?;
        let invocation = task.resolve()?;

        let mut state = self.inner.state.borrow_mut();
        state.next_item += 1;
        let id = state.next_item;
        let run_loop = state.current_or_autorun(&self.inner.config);
        let loop_id = run_loop.id();
        let target = run_loop
            .queues_mut()
            .get_mut(idx)
            .ok_or_else(|| RunLoopError::InvalidQueue {
                name: queue.to_string(),
            })?;

        let item = if once {
            target.push_once(id, invocation)
        } else {
            target.push(id, invocation);
            id
        };
        tracing::trace!("Queued item {} on '{}' in loop {}", item, queue, loop_id);

        Ok(QueueHandle { loop_id, item })
    }

    /// Runs `task` in its own loop once `wait_ms` have elapsed.
    pub fn later(&self, task: Task, wait_ms: u64) -> Result<TimerHandle> {
        let invocation = task.resolve()?;
        let fire_at = self.now().saturating_add(wait_ms);
        let id = self
            .inner
            .state
            .borrow_mut()
            .timers
            .register(fire_at, TimerAction::Invoke(invocation), None);
        tracing::debug!("Timer {:?} registered for {}ms", id, fire_at);
        Ok(TimerHandle(id))
    }

    /// Runs `task` on a later turn. Never runs inside the current loop, nor
    /// within the `tick` that is currently firing timers.
    pub fn next(&self, task: Task) -> Result<TimerHandle> {
        self.later(task, 0)
    }

    /// At most one execution per `wait_ms` window per (target, method).
    ///
    /// With `immediate`, the first call runs synchronously and later calls
    /// inside the window are dropped. Without it, the call runs when the
    /// window closes, using the arguments of the last call made inside it.
    pub fn throttle(&self, task: Task, wait_ms: u64, immediate: bool) -> Result<TimerHandle> {
        let invocation = task.resolve()?;
        let key = invocation.key().clone();
        let fire_at = self.now().saturating_add(wait_ms);

        let (id, run_now) = {
            let mut state = self.inner.state.borrow_mut();
            if let Some(&open) = state.throttled.get(&key) {
                if state.timers.is_pending(open) {
                    if !immediate {
                        state.timers.update_args(open, invocation.into_args());
                    }
                    tracing::trace!("Throttled call inside window {:?}", open);
                    return Ok(TimerHandle(open));
                }
                state.throttled.remove(&key);
            }

            let (action, run_now) = if immediate {
                (TimerAction::Window, Some(invocation))
            } else {
                (TimerAction::Invoke(invocation), None)
            };
            let id = state
                .timers
                .register(fire_at, action, Some(TimerOwner::Throttle(key.clone())));
            state.throttled.insert(key, id);
            (id, run_now)
        };

        if let Some(invocation) = run_now {
            self.join_invocation(invocation)?;
        }
        Ok(TimerHandle(id))
    }

    /// Restarts a `wait_ms` timer on every call for the same (target,
    /// method); the task runs once the calls stop.
    ///
    /// With `immediate`, the first call runs synchronously and the timer is
    /// a cooldown: calls before it lapses only restart it. Cancelling the
    /// returned handle ends the cooldown early.
    pub fn debounce(&self, task: Task, wait_ms: u64, immediate: bool) -> Result<TimerHandle> {
        let invocation = task.resolve()?;
        let key = invocation.key().clone();
        let fire_at = self.now().saturating_add(wait_ms);

        let (id, run_now) = {
            let mut state = self.inner.state.borrow_mut();
            let previous = state.debounced.remove(&key);
            let cooling = previous.is_some_and(|id| state.timers.cancel(id));

            let (action, run_now) = if immediate {
                (TimerAction::Window, (!cooling).then_some(invocation))
            } else {
                (TimerAction::Invoke(invocation), None)
            };
            let id = state
                .timers
                .register(fire_at, action, Some(TimerOwner::Debounce(key.clone())));
            state.debounced.insert(key, id);
            (id, run_now)
        };

        if let Some(invocation) = run_now {
            self.join_invocation(invocation)?;
        }
        Ok(TimerHandle(id))
    }

    /// Returns `true` if a pending timer or queued item was cancelled.
    pub fn cancel(&self, handle: impl Into<Handle>) -> bool {
        let mut state = self.inner.state.borrow_mut();
        match handle.into() {
            Handle::Timer(TimerHandle(id)) => {
                let owner = state.timers.owner(id).cloned();
                let cancelled = state.timers.cancel(id);
                if let (true, Some(owner)) = (cancelled, owner) {
                    state.release(&owner, id);
                }
                cancelled
            }
            Handle::Queued(QueueHandle { loop_id, item }) => state
                .stack
                .iter_mut()
                .find(|run_loop| run_loop.id() == loop_id)
                .is_some_and(|run_loop| run_loop.queues_mut().remove(item)),
        }
    }

    /// Drops every pending timer, including debounce and throttle windows.
    pub fn cancel_timers(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.timers.clear();
        state.debounced.clear();
        state.throttled.clear();
    }

    /// The host turn boundary.
    ///
    /// Ends an open autorun loop, then fires every timer that is due right
    /// now, each inside its own run loop. Timers registered while firing
    /// wait for the next tick. Returns the next deadline, if any, so the
    /// host knows when to call again.
    pub fn tick(&self) -> Result<Option<u64>> {
        self.end_autorun()?;

        let now = self.now();
        let due = self.inner.state.borrow_mut().timers.due(now);
        for id in due {
            let entry = {
                let mut state = self.inner.state.borrow_mut();
                // An earlier timer in this batch may have cancelled it.
                let Some(entry) = state.timers.take(id) else {
                    continue;
                };
                if let Some(owner) = &entry.owner {
                    state.release(owner, id);
                }
                entry
            };

            match entry.action {
                TimerAction::Invoke(invocation) => {
                    tracing::debug!("Timer {:?} fired at {}ms (due {}ms)", id, now, entry.fire_at);
                    self.run_invocation(invocation)?;
                }
                TimerAction::Window => {
                    tracing::trace!("Window {:?} closed at {}ms", id, now);
                }
            }
        }

        Ok(self.next_deadline())
    }

    fn end_autorun(&self) -> Result<()> {
        let open = self
            .inner
            .state
            .borrow()
            .stack
            .last()
            .is_some_and(|run_loop| run_loop.is_autorun() && run_loop.state() == LoopState::Running);
        if open {
            tracing::debug!("Ending autorun loop at turn boundary");
            self.end()
        } else {
            Ok(())
        }
    }

    /// Fixes receiver and leading arguments. Calls made through the result
    /// join this scheduler's current loop (or run in a new one).
    pub fn bind(&self, task: Task) -> Result<Bound> {
        Ok(binder::bind(task)?.joined(self))
    }
}
