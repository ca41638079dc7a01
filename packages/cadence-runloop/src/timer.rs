use crate::task::{Args, Invocation, InvocationKey};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct TimerId;
}

/// What a timer does when it comes due.
pub(crate) enum TimerAction {
    /// Run the invocation inside its own run loop.
    Invoke(Invocation),
    /// Nothing to run; the timer only marks the end of a debounce cooldown
    /// or a throttle window.
    Window,
}

/// Which rate limiter, if any, is waiting on this timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerOwner {
    Debounce(InvocationKey),
    Throttle(InvocationKey),
}

pub(crate) struct TimerEntry {
    pub fire_at: u64,
    seq: u64,
    pub action: TimerAction,
    pub owner: Option<TimerOwner>,
    cancelled: bool,
}

/// Arena of pending timers.
///
/// Cancelling flips a flag; the entry is dropped the next time it comes due.
/// Ids are generational, so an id whose timer already fired never matches a
/// newer timer.
#[derive(Default)]
pub struct TimerRegistry {
    timers: SlotMap<TimerId, TimerEntry>,
    next_seq: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, fire_at: u64, action: TimerAction, owner: Option<TimerOwner>) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(TimerEntry {
            fire_at,
            seq,
            action,
            owner,
            cancelled: false,
        })
    }

    /// Returns `false` if the timer already fired, was cancelled, or never
    /// existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.get_mut(id) {
            Some(entry) if !entry.cancelled => {
                entry.cancelled = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.get(id).is_some_and(|e| !e.cancelled)
    }

    pub(crate) fn owner(&self, id: TimerId) -> Option<&TimerOwner> {
        self.timers.get(id).and_then(|e| e.owner.as_ref())
    }

    /// Swaps the arguments of a pending invocation timer.
    pub(crate) fn update_args(&mut self, id: TimerId, args: Args) {
        if let Some(TimerEntry {
            action: TimerAction::Invoke(inv),
            cancelled: false,
            ..
        }) = self.timers.get_mut(id)
        {
            inv.replace_args(args);
        }
    }

    /// Ids of every live timer due at `now`, in fire order (fire time, then
    /// registration order). Cancelled entries that are due are purged.
    pub fn due(&mut self, now: u64) -> Vec<TimerId> {
        self.timers.retain(|_, e| !(e.cancelled && e.fire_at <= now));

        let mut due: Vec<(u64, u64, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, e)| e.fire_at <= now)
            .map(|(id, e)| (e.fire_at, e.seq, id))
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Removes a live timer so it can be fired.
    pub(crate) fn take(&mut self, id: TimerId) -> Option<TimerEntry> {
        if self.is_pending(id) {
            self.timers.remove(id)
        } else {
            None
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers
            .values()
            .filter(|e| !e.cancelled)
            .map(|e| e.fire_at)
            .min()
    }

    pub fn pending(&self) -> usize {
        self.timers.values().filter(|e| !e.cancelled).count()
    }

    pub fn has_pending(&self) -> bool {
        self.timers.values().any(|e| !e.cancelled)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
