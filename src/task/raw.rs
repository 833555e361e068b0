use std::{
    cell::RefCell,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    rc::Rc,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use crate::error::TaskError;

use super::{
    state::{Header, TaskState},
    TaskId,
};

/// Where a finished task leaves its result until the awaiting side picks it up.
pub(crate) type OutputSlot<T> = Rc<RefCell<Option<Result<T, TaskError>>>>;

/// How a continuation left the last resume.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Failed(TaskError),
}

/// A task body with its output type erased.
///
/// Polling drives the user future under `catch_unwind`; when it finishes, either way, the result
/// is written to the output slot before `Ready` is returned.
pub(crate) trait Continuation {
    fn resume(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome>;
}

pub(crate) struct Body<F: Future + ?Sized> {
    id: TaskId,
    label: Option<&'static str>,
    future: Pin<Box<F>>,
    slot: OutputSlot<F::Output>,
}

impl<F: Future + ?Sized> Body<F> {
    pub(crate) fn new(
        id: TaskId,
        label: Option<&'static str>,
        future: Pin<Box<F>>,
        slot: OutputSlot<F::Output>,
    ) -> Self {
        Self {
            id,
            label,
            future,
            slot,
        }
    }
}

impl<F: Future + ?Sized> Continuation for Body<F> {
    fn resume(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        // `Body` is `Unpin`: the future is already pinned on the heap
        let this = self.get_mut();
        let future = this.future.as_mut();

        match panic::catch_unwind(AssertUnwindSafe(|| future.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => {
                *this.slot.borrow_mut() = Some(Ok(output));
                Poll::Ready(Outcome::Completed)
            }
            Err(payload) => {
                let err = TaskError::panicked(this.id, this.label, payload);
                *this.slot.borrow_mut() = Some(Err(err.clone()));
                Poll::Ready(Outcome::Failed(err))
            }
        }
    }
}

/// Executor-side bookkeeping for one started task.
pub(crate) struct TaskCell {
    /// The continuation. `None` while it is being resumed.
    pub(crate) body: Option<Pin<Box<dyn Continuation>>>,

    /// Shared with the task's wakers.
    pub(crate) header: Arc<Header>,

    pub(crate) state: TaskState,

    /// Resumed once this task finishes. Set when the task is awaited, taken when it completes.
    pub(crate) parent: Option<Waker>,

    /// Whether a `JoinHandle` or the root error sink observes this task.
    pub(crate) root: bool,

    /// Set once the awaiting side went away. The task's failure then goes to the root error sink.
    pub(crate) detached: bool,

    pub(crate) label: Option<&'static str>,
}

impl TaskCell {
    pub(crate) fn new(label: Option<&'static str>, root: bool) -> Self {
        Self {
            body: None,
            header: Arc::new(Header::new()),
            state: TaskState::Created,
            parent: None,
            root,
            detached: false,
            label,
        }
    }
}
