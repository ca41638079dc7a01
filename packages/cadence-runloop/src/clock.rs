use std::cell::Cell;
use std::time::Instant;

/// The host's monotonic time source, in milliseconds.
///
/// The scheduler never sleeps itself. Hosts call [`Scheduler::tick`] and
/// wait until the returned deadline using whatever timer primitive they have
/// (an event loop, `setTimeout`, a tokio sleep...).
///
/// [`Scheduler::tick`]: crate::Scheduler::tick
pub trait Clock {
    fn now(&self) -> u64;
}

/// Virtual time. Only moves when told to, which keeps tests deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u64) -> Self {
        Self { now: Cell::new(ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, ms: u64) {
        // Monotonic: never go backwards.
        if ms > self.now.get() {
            self.now.set(ms);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}

/// Wall-clock time measured from the moment the clock was created.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
