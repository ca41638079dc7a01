use crate::config::SchedulerConfig;
use crate::queue::{QueueItem, QueueTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Flushing,
    Ended,
}

/// One begin → flush → end cycle.
pub struct RunLoop {
    id: u64,
    state: LoopState,
    queues: QueueTable,
    autorun: bool,
    // queue currently being drained
    cursor: usize,
}

impl RunLoop {
    pub(crate) fn new(id: u64, config: &SchedulerConfig, autorun: bool) -> Self {
        Self {
            id,
            state: LoopState::Idle,
            queues: QueueTable::from_config(config),
            autorun,
            cursor: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether the loop was opened implicitly by scheduling outside any loop.
    pub fn is_autorun(&self) -> bool {
        self.autorun
    }

    pub fn queues(&self) -> &QueueTable {
        &self.queues
    }

    pub(crate) fn queues_mut(&mut self) -> &mut QueueTable {
        &mut self.queues
    }

    pub(crate) fn start(&mut self) {
        debug_assert_eq!(self.state, LoopState::Idle);
        self.state = LoopState::Running;
    }

    pub(crate) fn start_flush(&mut self) {
        self.state = LoopState::Flushing;
        self.cursor = 0;
    }

    /// Next item to execute, honouring queue order.
    ///
    /// The current queue is drained until empty (including anything it
    /// schedules into itself). Once it is empty, draining continues at the
    /// first queue with work, which can be an earlier queue that received
    /// items in the meantime. `None` means every queue is empty.
    pub(crate) fn next_item(&mut self) -> Option<QueueItem> {
        loop {
            if let Some(item) = self.queues.get_mut(self.cursor).and_then(|q| q.pop()) {
                return Some(item);
            }
            self.cursor = self.queues.first_with_work()?;
        }
    }

    pub(crate) fn current_queue(&self) -> Option<&str> {
        self.queues.get(self.cursor).map(|q| q.name())
    }

    /// Tears the loop down. Anything still queued is dropped.
    pub(crate) fn finish(&mut self) {
        self.queues.clear();
        self.state = LoopState::Ended;
    }
}
