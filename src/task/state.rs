use core::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::TaskId;

/// Set if the task sits in the ready queue.
///
/// Set by whoever pushes the task id and cleared by the executor right before the task is
/// resumed, so a wake that arrives while the task is running queues it again.
const SCHEDULED: usize = 1 << 0;

/// Set once the task has completed or failed. Wakes after this point are dropped.
const COMPLETED: usize = 1 << 1;

/// Lifecycle of a task as seen by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed and registered, never resumed.
    Created,
    /// Being resumed right now.
    Running,
    /// Parked at a suspension point.
    Suspended(Awaiting),
    /// Ran to completion (or failed). Only observable while the cell is being released.
    Completed,
}

/// What a suspended task is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Awaiting {
    /// Another task, started by this one.
    Child(TaskId),
    /// A leaf operation running on the worker pool.
    Leaf,
    /// Any other future that returned `Pending`.
    Other,
}

#[must_use]
pub(crate) enum TransitionToScheduled {
    /// The caller must push the task id onto the ready queue.
    Submit,
    /// Already queued or completed.
    DoNothing,
}

/// The part of a task shared with its wakers.
///
/// Wakers travel to background workers, so this is the only task state touched off the executor
/// thread.
pub(crate) struct Header {
    state: AtomicUsize,
}

impl Header {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    pub(crate) fn transition_to_scheduled(&self) -> TransitionToScheduled {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current & (SCHEDULED | COMPLETED) != 0 {
                return TransitionToScheduled::DoNothing;
            }

            match self.state.compare_exchange_weak(
                current,
                current | SCHEDULED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return TransitionToScheduled::Submit,
                Err(actual) => current = actual,
            }
        }
    }

    /// Clears the scheduled bit. Returns `false` if the task had not been scheduled.
    pub(crate) fn transition_to_running(&self) -> bool {
        self.state.fetch_and(!SCHEDULED, Ordering::AcqRel) & SCHEDULED != 0
    }

    pub(crate) fn set_completed(&self) {
        self.state.fetch_or(COMPLETED, Ordering::AcqRel);
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self) -> bool {
        self.state.load(Ordering::Acquire) & SCHEDULED != 0
    }

    pub(crate) fn to_compact_string(&self) -> String {
        let state = self.state.load(Ordering::Acquire);
        format!(
            "{}{}",
            if state & SCHEDULED != 0 { "S" } else { "_" },
            if state & COMPLETED != 0 { "C" } else { "_" },
        )
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("state", &self.to_compact_string())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{Header, TransitionToScheduled};

    #[test]
    fn scheduled_at_most_once() {
        let header = Header::new();

        assert!(matches!(
            header.transition_to_scheduled(),
            TransitionToScheduled::Submit
        ));
        assert!(matches!(
            header.transition_to_scheduled(),
            TransitionToScheduled::DoNothing
        ));

        assert!(header.transition_to_running());
        assert!(!header.is_scheduled());
        assert!(matches!(
            header.transition_to_scheduled(),
            TransitionToScheduled::Submit
        ));
    }

    #[test]
    fn completed_tasks_are_never_scheduled() {
        let header = Header::new();
        header.set_completed();

        assert!(matches!(
            header.transition_to_scheduled(),
            TransitionToScheduled::DoNothing
        ));
        assert_eq!(header.to_compact_string(), "_C");
    }
}
