use std::{
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    task::{Context, Poll},
};

use crate::{error::TaskError, executor::Handle};

use super::{raw::OutputSlot, Awaiting, TaskId};

/// A lazily started asynchronous computation.
///
/// Constructing a task does not run any of its body. Await it from another task's body to run it
/// as a child, or spawn it on an executor to run it as a root task.
///
/// Awaiting a task yields `Result<T, TaskError>`: `Err` if the body panicked.
#[must_use = "tasks do nothing unless awaited or spawned"]
pub struct Task<T> {
    handle: Handle,
    label: Option<&'static str>,
    future: Pin<Box<dyn Future<Output = T>>>,
}

impl<T: 'static> Task<T> {
    /// Wraps `future` in a task bound to the executor behind `handle`.
    pub fn new(handle: &Handle, future: impl Future<Output = T> + 'static) -> Self {
        Self {
            handle: handle.clone(),
            label: None,
            future: Box::pin(future),
        }
    }

    /// Attaches a label, reported in logs, in [`TaskError`]s and used by
    /// [`TaskDebugger`](super::debugging::TaskDebugger) filters.
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Handle,
        Option<&'static str>,
        Pin<Box<dyn Future<Output = T>>>,
    ) {
        (self.handle, self.label, self.future)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label).finish()
    }
}

impl<T: 'static> IntoFuture for Task<T> {
    type Output = Result<T, TaskError>;
    type IntoFuture = Awaited<T>;

    fn into_future(self) -> Self::IntoFuture {
        Awaited {
            stage: Stage::Created(self),
        }
    }
}

enum Stage<T> {
    /// Not kicked off yet.
    Created(Task<T>),

    /// Started as a child and suspended; the parent is registered on the child's cell.
    Awaiting {
        handle: Handle,
        id: TaskId,
        slot: OutputSlot<T>,
    },

    Done,
}

/// The future returned by awaiting a [`Task`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Awaited<T> {
    stage: Stage<T>,
}

impl<T> Unpin for Awaited<T> {}

impl<T: 'static> Future for Awaited<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Created(task) => {
                let (handle, label, future) = task.into_parts();
                let core = handle.core();

                let (id, slot) = core.insert(future, label, false);
                core.resume(id);

                // finished during kick-off: no parent to record, nothing to suspend on
                if let Some(output) = slot.borrow_mut().take() {
                    return Poll::Ready(output);
                }

                core.set_parent(id, cx.waker());
                core.note_awaiting(Awaiting::Child(id));
                self.stage = Stage::Awaiting { handle, id, slot };
                Poll::Pending
            }
            Stage::Awaiting { handle, id, slot } => {
                if let Some(output) = slot.borrow_mut().take() {
                    return Poll::Ready(output);
                }

                // polled before the child finished; keep the registration current
                let core = handle.core();
                core.set_parent(id, cx.waker());
                core.note_awaiting(Awaiting::Child(id));
                self.stage = Stage::Awaiting { handle, id, slot };
                Poll::Pending
            }
            Stage::Done => panic!("`Awaited` polled after completion"),
        }
    }
}

impl<T> Drop for Awaited<T> {
    fn drop(&mut self) {
        if let Stage::Awaiting { handle, id, .. } = &self.stage {
            handle.core().detach(*id);
        }
    }
}
