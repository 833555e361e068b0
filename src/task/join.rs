use std::fmt;

use crate::error::TaskError;

use super::{raw::OutputSlot, TaskId};

/// Observes the result of a root task.
///
/// Root tasks have no parent to resume, so their output (or failure) is parked here. The
/// executor releases the task itself as soon as it finishes; the handle only keeps the output.
pub struct JoinHandle<T> {
    id: TaskId,
    slot: OutputSlot<T>,
    taken: bool,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, slot: OutputSlot<T>) -> Self {
        Self {
            id,
            slot,
            taken: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task has completed or failed.
    pub fn is_finished(&self) -> bool {
        self.taken || self.slot.borrow().is_some()
    }

    /// Takes the task's result if it has finished.
    ///
    /// Returns `None` before the task finishes and after the result has been taken once.
    pub fn try_take(&mut self) -> Option<Result<T, TaskError>> {
        let output = self.slot.borrow_mut().take();
        if output.is_some() {
            self.taken = true;
        }
        output
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
