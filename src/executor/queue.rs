use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
    time::Duration,
};

use crate::{task::TaskId, utils::lock};

/// The ready queue: ids of tasks that may be resumed, in FIFO order.
///
/// Pushed from the executor thread (spawns, completions waking a parent) and from worker threads
/// (leaf completions). Only the executor thread pops.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<TaskId>,
    stopped: bool,
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueue {
    pub(crate) const DEFAULT_CAPACITY: usize = 4096;

    pub(crate) fn new() -> Self {
        Self::new_with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub(crate) fn new_with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).queue.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&self, id: TaskId) {
        lock(&self.inner).queue.push_back(id);
        self.available.notify_one();
    }

    pub(crate) fn pop(&self) -> Option<TaskId> {
        lock(&self.inner).queue.pop_front()
    }

    /// Blocks until a task id is pushed, a stop is requested, or `timeout` elapses.
    pub(crate) fn park(&self, timeout: Option<Duration>) {
        let inner = lock(&self.inner);
        if !inner.queue.is_empty() || inner.stopped {
            return;
        }

        match timeout {
            Some(timeout) => {
                let (_inner, _) = self
                    .available
                    .wait_timeout_while(inner, timeout, |inner| {
                        inner.queue.is_empty() && !inner.stopped
                    })
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            None => {
                let _inner = self
                    .available
                    .wait_while(inner, |inner| inner.queue.is_empty() && !inner.stopped)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }
    }

    pub(crate) fn stop(&self) {
        lock(&self.inner).stopped = true;
        self.available.notify_all();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        lock(&self.inner).stopped
    }

    /// Re-arms the queue after a stop so the executor can be driven again.
    pub(crate) fn reset_stop(&self) {
        lock(&self.inner).stopped = false;
    }
}
