use anyhow::{Result, bail};
use cadence_runloop::{Clock, ManualClock, Scheduler, SystemClock};
use std::rc::Rc;
use std::time::Duration;

/// Upper bound on turns per `advance`, so a timer that keeps re-arming
/// itself at the same instant cannot hang the simulation.
const MAX_TURNS: usize = 10_000;

/// Drives the scheduler's host turns, either on virtual time or on the
/// wall clock.
pub enum Host {
    Virtual(Rc<ManualClock>),
    Realtime(Rc<SystemClock>),
}

impl Host {
    pub fn virtual_time() -> Self {
        Host::Virtual(Rc::new(ManualClock::new()))
    }

    pub fn realtime() -> Self {
        Host::Realtime(Rc::new(SystemClock::new()))
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        match self {
            Host::Virtual(clock) => clock.clone(),
            Host::Realtime(clock) => clock.clone(),
        }
    }

    /// Lets `ms` milliseconds pass, firing every timer that comes due on
    /// the way.
    pub async fn advance(&self, scheduler: &Scheduler, ms: u64) -> Result<()> {
        let until = scheduler.now().saturating_add(ms);
        self.run_until(scheduler, Some(until)).await
    }

    /// Keeps turning until no timers are left.
    pub async fn drain(&self, scheduler: &Scheduler) -> Result<()> {
        self.run_until(scheduler, None).await
    }

    async fn run_until(&self, scheduler: &Scheduler, until: Option<u64>) -> Result<()> {
        let mut turns = 0;
        loop {
            let next = scheduler.tick()?;
            let now = scheduler.now();
            let wake = match (next, until) {
                (Some(deadline), Some(until)) if deadline <= until => deadline,
                (_, Some(until)) if now < until => until,
                (_, Some(_)) => return Ok(()),
                (Some(deadline), None) => deadline,
                (None, None) => return Ok(()),
            };

            turns += 1;
            if turns > MAX_TURNS {
                bail!("gave up after {} turns at {}ms; a timer keeps re-arming itself", MAX_TURNS, now);
            }
            tracing::trace!("Host sleeping from {}ms until {}ms", now, wake);
            self.wait_until(wake).await;
        }
    }

    async fn wait_until(&self, at: u64) {
        match self {
            Host::Virtual(clock) => clock.set(at),
            Host::Realtime(clock) => {
                let now = clock.now();
                if at > now {
                    tokio::time::sleep(Duration::from_millis(at - now)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_runloop::{Method, Task};
    use std::cell::RefCell;

    #[tokio::test(flavor = "current_thread")]
    async fn advance_fires_timers_in_deadline_order() {
        let host = Host::virtual_time();
        let scheduler = Scheduler::new(host.clock());
        let log = Rc::new(RefCell::new(Vec::new()));

        for (label, wait) in [("b", 20), ("a", 10), ("c", 40)] {
            let log = log.clone();
            let sch = scheduler.clone();
            scheduler
                .later(Task::new(Method::from_fn(move || log.borrow_mut().push((label, sch.now())))), wait)
                .unwrap();
        }

        host.advance(&scheduler, 30).await.unwrap();
        assert_eq!(*log.borrow(), vec![("a", 10), ("b", 20)]);
        assert_eq!(scheduler.now(), 30);

        host.drain(&scheduler).await.unwrap();
        assert_eq!(log.borrow().last(), Some(&("c", 40)));
        assert!(!scheduler.has_scheduled_timers());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn runaway_timer_is_reported() {
        let host = Host::virtual_time();
        let scheduler = Scheduler::new(host.clock());

        fn rearm(scheduler: Scheduler) {
            let sch = scheduler.clone();
            scheduler
                .next(Task::new(Method::from_fn(move || rearm(sch.clone()))))
                .unwrap();
        }
        rearm(scheduler.clone());

        assert!(host.drain(&scheduler).await.is_err());
    }
}
