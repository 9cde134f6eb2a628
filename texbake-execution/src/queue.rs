//! Master task queue
//!
//! Two FIFO lanes: retried tasks and fresh tasks. Pops drain the retry lane
//! first, so a requeued task runs before anything queued after it, but after
//! tasks that were requeued earlier.

use std::collections::VecDeque;

use texbake_core::BakeTask;

#[derive(Debug, Default)]
pub struct MasterQueue {
    retry: VecDeque<BakeTask>,
    fresh: VecDeque<BakeTask>,
    requeued: usize,
}

impl MasterQueue {
    pub fn new(tasks: impl IntoIterator<Item = BakeTask>) -> Self {
        Self {
            retry: VecDeque::new(),
            fresh: tasks.into_iter().collect(),
            requeued: 0,
        }
    }

    /// Put a task back for another attempt
    pub fn requeue(&mut self, task: BakeTask) {
        self.requeued += 1;
        self.retry.push_back(task);
    }

    pub fn pop(&mut self) -> Option<BakeTask> {
        self.retry.pop_front().or_else(|| self.fresh.pop_front())
    }

    pub fn len(&self) -> usize {
        self.retry.len() + self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retry.is_empty() && self.fresh.is_empty()
    }

    /// Total number of requeues so far
    pub fn requeue_count(&self) -> usize {
        self.requeued
    }
}
