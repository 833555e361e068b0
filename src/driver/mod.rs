//! Leaf operations: primitive asynchronous work that runs off the executor thread.
//!
//! A leaf never completes on its first poll. It hands its operation, together with the waker
//! of the task awaiting it, to the worker pool and suspends. A worker performs the operation,
//! stores the result and wakes the task, which queues it on the executor again. The task then
//! picks up the result when it is resumed, on the executor thread.
pub mod ops;
pub(crate) mod pool;

use std::{
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
    thread,
};

pub use pool::CancelSignal;

use crate::{
    error::{Error, Result},
    executor::Handle,
    task::Awaiting,
    utils::{lock, panic_message},
};

/// A primitive operation performed by a background worker.
pub trait LeafOp: fmt::Debug + Send + 'static {
    type Output: Send + 'static;

    /// Does the work. Runs on a worker thread.
    ///
    /// Blocking implementations should wait on `cancel` rather than sleep outright, so shutting
    /// the executor down does not wait for them.
    fn perform(self, cancel: &CancelSignal) -> Self::Output;
}

// In-flight operation, shared between the leaf and the job running it
enum Lifecycle<T> {
    /// The job has been submitted and the task is waiting for its completion
    Waiting(Waker),

    /// The job has finished (or panicked)
    Completed(thread::Result<T>),

    /// The result has been handed to the task
    Taken,
}

impl<T> Lifecycle<T> {
    fn complete(&mut self, result: thread::Result<T>) {
        match std::mem::replace(self, Lifecycle::Completed(result)) {
            Lifecycle::Waiting(waker) => waker.wake(),
            Lifecycle::Completed(..) | Lifecycle::Taken => unreachable!("invalid operation state"),
        }
    }
}

enum LeafState<O: LeafOp> {
    Idle(O),
    Submitted(Arc<Mutex<Lifecycle<O::Output>>>),
    /// Submission failed; reported on the next poll so the leaf still suspends once.
    Failed(Error),
    Done,
}

/// Awaitable wrapper around a [`LeafOp`].
///
/// Resolves to the operation's output, or to an error if it could not be handed to a worker or
/// panicked while running.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Leaf<O: LeafOp> {
    handle: Handle,
    state: LeafState<O>,
}

impl<O: LeafOp> Unpin for Leaf<O> {}

impl<O: LeafOp> Leaf<O> {
    pub fn new(handle: &Handle, op: O) -> Self {
        Self {
            handle: handle.clone(),
            state: LeafState::Idle(op),
        }
    }

    fn submit(&self, op: O, cx: &mut Context<'_>) -> Result<Arc<Mutex<Lifecycle<O::Output>>>> {
        let lifecycle = Arc::new(Mutex::new(Lifecycle::Waiting(cx.waker().clone())));

        let shared = lifecycle.clone();
        let job = Box::new(move |cancel: &CancelSignal| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| op.perform(cancel)));
            lock(&shared).complete(result);
        });

        self.handle.core().pool().submit(job)?;
        Ok(lifecycle)
    }
}

impl<O: LeafOp> fmt::Debug for Leaf<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            LeafState::Idle(op) => format!("Idle({:?})", op),
            LeafState::Submitted(..) => "Submitted".to_owned(),
            LeafState::Failed(err) => format!("Failed({})", err),
            LeafState::Done => "Done".to_owned(),
        };
        f.debug_struct("Leaf").field("state", &state).finish()
    }
}

impl<O: LeafOp> Future for Leaf<O> {
    type Output = Result<O::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match std::mem::replace(&mut self.state, LeafState::Done) {
            LeafState::Idle(op) => {
                tracing::debug!(op = ?op, "scheduling leaf operation");
                self.state = match self.submit(op, cx) {
                    Ok(lifecycle) => LeafState::Submitted(lifecycle),
                    Err(err) => {
                        cx.waker().wake_by_ref();
                        LeafState::Failed(err)
                    }
                };
                self.handle.core().note_awaiting(Awaiting::Leaf);
                Poll::Pending
            }
            LeafState::Submitted(lifecycle) => {
                let completed = {
                    let mut guard = lock(&lifecycle);
                    match std::mem::replace(&mut *guard, Lifecycle::Taken) {
                        Lifecycle::Waiting(waker) if !waker.will_wake(cx.waker()) => {
                            *guard = Lifecycle::Waiting(cx.waker().clone());
                            None
                        }
                        Lifecycle::Waiting(waker) => {
                            *guard = Lifecycle::Waiting(waker);
                            None
                        }
                        Lifecycle::Completed(result) => Some(result),
                        Lifecycle::Taken => unreachable!("invalid operation state"),
                    }
                };

                match completed {
                    None => {
                        self.state = LeafState::Submitted(lifecycle);
                        self.handle.core().note_awaiting(Awaiting::Leaf);
                        Poll::Pending
                    }
                    Some(Ok(output)) => Poll::Ready(Ok(output)),
                    Some(Err(payload)) => Poll::Ready(Err(Error::LeafPanicked {
                        message: panic_message(payload),
                    })),
                }
            }
            LeafState::Failed(err) => Poll::Ready(Err(err)),
            LeafState::Done => panic!("`Leaf` polled after completion"),
        }
    }
}
