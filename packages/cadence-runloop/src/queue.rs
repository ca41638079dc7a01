use crate::config::SchedulerConfig;
use crate::task::{Invocation, InvocationKey};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

pub(crate) struct QueueItem {
    pub id: u64,
    pub invocation: Invocation,
    once: bool,
}

/// A FIFO of invocations with run-once bookkeeping.
pub struct Queue {
    name: String,
    items: VecDeque<QueueItem>,
    // key -> item id, only for entries added through `push_once`
    once_index: FxHashMap<InvocationKey, u64>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: VecDeque::new(),
            once_index: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn push(&mut self, id: u64, invocation: Invocation) {
        self.items.push_back(QueueItem {
            id,
            invocation,
            once: false,
        });
    }

    /// Adds `invocation` unless an entry with the same key is still waiting,
    /// in which case that entry keeps its position and takes the new
    /// arguments. Returns the id of the entry that will run.
    pub(crate) fn push_once(&mut self, id: u64, invocation: Invocation) -> u64 {
        if let Some(&existing) = self.once_index.get(invocation.key()) {
            if let Some(item) = self.items.iter_mut().find(|item| item.id == existing) {
                item.invocation.replace_args(invocation.into_args());
                return existing;
            }
        }

        self.once_index.insert(invocation.key().clone(), id);
        self.items.push_back(QueueItem {
            id,
            invocation,
            once: true,
        });
        id
    }

    pub(crate) fn pop(&mut self) -> Option<QueueItem> {
        let item = self.items.pop_front()?;
        self.forget(&item);
        Some(item)
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        match self.items.iter().position(|item| item.id == id) {
            Some(pos) => {
                if let Some(item) = self.items.remove(pos) {
                    self.forget(&item);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.once_index.clear();
    }

    fn forget(&mut self, item: &QueueItem) {
        if item.once {
            self.once_index.remove(item.invocation.key());
        }
    }
}

/// The ordered set of queues owned by one run loop.
pub struct QueueTable {
    queues: Vec<Queue>,
}

impl QueueTable {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            queues: config.queues.iter().map(Queue::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.queues.iter().position(|q| q.name == name)
    }

    pub fn get(&self, idx: usize) -> Option<&Queue> {
        self.queues.get(idx)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Queue> {
        self.queues.get_mut(idx)
    }

    pub fn first_with_work(&self) -> Option<usize> {
        self.queues.iter().position(|q| !q.is_empty())
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.queues.iter_mut().any(|q| q.remove(id))
    }

    pub(crate) fn clear(&mut self) {
        for q in &mut self.queues {
            q.clear();
        }
    }
}
