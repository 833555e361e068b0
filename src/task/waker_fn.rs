#[cfg(test)]
use std::task::{RawWaker, RawWakerVTable};
use std::{
    sync::Arc,
    task::{Wake, Waker},
};

use crate::executor::queue::ReadyQueue;

use super::{
    state::{Header, TransitionToScheduled},
    TaskId,
};

/// The resumable handle of a task.
///
/// Waking it pushes the task id onto the ready queue of the executor that owns the task, unless
/// the task is already queued. This is the only runtime operation background workers perform.
pub(crate) struct TaskWaker {
    id: TaskId,
    header: Arc<Header>,
    queue: Arc<ReadyQueue>,
}

impl TaskWaker {
    pub(crate) fn waker(id: TaskId, header: Arc<Header>, queue: Arc<ReadyQueue>) -> Waker {
        Waker::from(Arc::new(TaskWaker { id, header, queue }))
    }

    /// Marks the task scheduled and pushes it. Returns `false` if it was already queued.
    pub(crate) fn schedule(id: TaskId, header: &Header, queue: &ReadyQueue) -> bool {
        match header.transition_to_scheduled() {
            TransitionToScheduled::Submit => {
                queue.push(id);
                true
            }
            TransitionToScheduled::DoNothing => false,
        }
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !Self::schedule(self.id, &self.header, &self.queue) {
            tracing::trace!(task = ?self.id, "wake ignored, task already queued or finished");
        }
    }
}

/// A waker that does nothing. Used to poll futures outside of an executor.
#[cfg(test)]
pub(crate) fn dummy_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }

    fn noop(_: *const ()) {}

    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);

    fn raw_waker() -> RawWaker {
        // the pointer is never dereferenced so null is ok
        RawWaker::new(std::ptr::null::<()>(), &VTABLE)
    }

    unsafe { Waker::from_raw(raw_waker()) }
}
