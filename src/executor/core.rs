use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    rc::Rc,
    sync::Arc,
    task::{Context, Poll, Waker},
    time::Duration,
};

use slotmap::SlotMap;

use crate::{
    driver::{
        ops::{Blocking, Delay, Offload, Sleep},
        pool::WorkerPool,
        Leaf,
    },
    error::TaskError,
    task::{
        dbg_context,
        debugging::TaskDebugger,
        raw::{Body, Continuation, Outcome, OutputSlot, TaskCell},
        waker_fn::TaskWaker,
        Awaiting, JoinHandle, Task, TaskId, TaskState,
    },
};

use super::{queue::ReadyQueue, RootErrorPolicy, RunReport};

scoped_tls::scoped_thread_local!(pub(super) static CURRENT: Handle);

/// State of one executor. Lives on the executor thread; background workers only ever see the
/// ready queue, through task wakers.
pub(crate) struct Core {
    pub(super) id: usize,
    tasks: RefCell<SlotMap<TaskId, TaskCell>>,
    pub(super) queue: Arc<ReadyQueue>,
    pool: WorkerPool,
    policy: RootErrorPolicy,
    /// The task being resumed, innermost first when a child is kicked off inline.
    current: Cell<Option<TaskId>>,
    report: RefCell<RunReport>,
    escalated: RefCell<Option<TaskError>>,
}

impl Core {
    pub(super) fn new(
        id: usize,
        queue: ReadyQueue,
        pool: WorkerPool,
        policy: RootErrorPolicy,
    ) -> Self {
        Self {
            id,
            tasks: RefCell::new(SlotMap::with_key()),
            queue: Arc::new(queue),
            pool,
            policy,
            current: Cell::new(None),
            report: RefCell::new(RunReport::default()),
            escalated: RefCell::new(None),
        }
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(super) fn live_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Registers a started task. It does not run until resumed.
    pub(crate) fn insert<T: 'static>(
        &self,
        future: Pin<Box<dyn Future<Output = T>>>,
        label: Option<&'static str>,
        root: bool,
    ) -> (TaskId, OutputSlot<T>) {
        let slot: OutputSlot<T> = Rc::new(RefCell::new(None));

        let id = self.tasks.borrow_mut().insert_with_key(|id| {
            let body = Body::new(id, label, future, slot.clone());
            let mut cell = TaskCell::new(label, root);
            cell.body = Some(Box::pin(body) as Pin<Box<dyn Continuation>>);
            cell
        });

        if TaskDebugger::register(self.id, id, label) {
            dbg_context!(self.id, id, "insert", {});
        }
        tracing::trace!(executor = self.id, task = ?id, label = label.unwrap_or(""), root, "task created");

        (id, slot)
    }

    /// Puts a task on the ready queue unless it is already there.
    pub(crate) fn schedule(&self, id: TaskId) {
        let header = self.tasks.borrow().get(id).map(|cell| cell.header.clone());
        if let Some(header) = header {
            dbg_context!(self.id, id, "schedule", {
                TaskWaker::schedule(id, &header, &self.queue);
            })
        }
    }

    /// Resumes a task up to its next suspension point or completion.
    ///
    /// Returns `false` if there was nothing to resume: the task was already released (a stale
    /// wake) or is in the middle of being resumed further up the stack.
    pub(crate) fn resume(&self, id: TaskId) -> bool {
        dbg_context!(self.id, id, "resume", {
            let (mut body, header) = {
                let mut tasks = self.tasks.borrow_mut();
                let Some(cell) = tasks.get_mut(id) else {
                    tracing::trace!(task = ?id, "skipping released task");
                    return false;
                };
                let Some(body) = cell.body.take() else {
                    tracing::trace!(task = ?id, "skipping task that is already running");
                    return false;
                };
                cell.state = TaskState::Running;
                (body, cell.header.clone())
            };

            // a wake from here on queues the task again
            let _ = header.transition_to_running();
            let waker = TaskWaker::waker(id, header, self.queue.clone());
            let cx = &mut Context::from_waker(&waker);

            let prev = self.current.replace(Some(id));
            let prev_dbg = TaskDebugger::set_current_task(Some(id));
            let poll = body.as_mut().resume(cx);
            TaskDebugger::set_current_task(prev_dbg);
            self.current.set(prev);

            self.report.borrow_mut().resumptions += 1;

            match poll {
                Poll::Pending => {
                    if let Some(cell) = self.tasks.borrow_mut().get_mut(id) {
                        cell.body = Some(body);
                        if cell.state == TaskState::Running {
                            cell.state = TaskState::Suspended(Awaiting::Other);
                        }
                    }
                }
                Poll::Ready(outcome) => self.complete(id, body, outcome),
            }

            true
        })
    }

    /// Releases a finished task and routes its completion.
    ///
    /// The continuation is dropped right away. The output already sits in the task's output
    /// slot; the parent, if one is registered, is queued to pick it up.
    fn complete(&self, id: TaskId, body: Pin<Box<dyn Continuation>>, outcome: Outcome) {
        dbg_context!(self.id, id, "complete", {
            let cell = self.tasks.borrow_mut().remove(id);

            // dropping the body can run arbitrary destructors, which may call back into the core
            if panic::catch_unwind(AssertUnwindSafe(|| drop(body))).is_err() {
                tracing::error!(task = ?id, "task destructor panicked");
            }

            let Some(mut cell) = cell else {
                return;
            };
            cell.state = TaskState::Completed;
            cell.header.set_completed();
            TaskDebugger::unregister(self.id, id);

            {
                let mut report = self.report.borrow_mut();
                match outcome {
                    Outcome::Completed => report.completed += 1,
                    Outcome::Failed(_) => report.failed += 1,
                }
            }

            match (cell.parent.take(), outcome) {
                (Some(parent), outcome) => {
                    if let Outcome::Failed(err) = &outcome {
                        tracing::debug!(task = ?id, error = %err, "delivering failure to parent");
                    }
                    tracing::trace!(task = ?id, "task finished, queueing parent");
                    parent.wake();
                }
                // no one is left to observe a detached child's failure
                (None, Outcome::Failed(err)) if cell.root || cell.detached => self.root_failed(err),
                (None, Outcome::Completed) if cell.root => {
                    tracing::debug!(
                        executor = self.id,
                        task = ?id,
                        label = cell.label.unwrap_or(""),
                        "root task finished"
                    );
                }
                (None, outcome) => {
                    tracing::trace!(task = ?id, ?outcome, "task finished with no parent registered");
                }
            }
        })
    }

    fn root_failed(&self, err: TaskError) {
        self.report.borrow_mut().root_failures.push(err.clone());

        match self.policy {
            RootErrorPolicy::Log => {
                tracing::error!(
                    executor = self.id,
                    task = ?err.task(),
                    label = err.label().unwrap_or(""),
                    error = %err,
                    "root task failed"
                );
            }
            RootErrorPolicy::Escalate => {
                *self.escalated.borrow_mut() = Some(err);
            }
        }
    }

    pub(super) fn take_escalated(&self) -> Option<TaskError> {
        self.escalated.borrow_mut().take()
    }

    pub(super) fn take_report(&self) -> RunReport {
        std::mem::take(&mut *self.report.borrow_mut())
    }

    /// Pops one id off the ready queue and resumes it. Returns `false` if the queue was empty.
    pub(super) fn run_next(&self) -> bool {
        match self.queue.pop() {
            Some(id) => {
                self.resume(id);
                true
            }
            None => false,
        }
    }

    /// Records `waker` as the task to resume once `id` finishes.
    pub(crate) fn set_parent(&self, id: TaskId, waker: &Waker) {
        if let Some(cell) = self.tasks.borrow_mut().get_mut(id) {
            match &cell.parent {
                Some(parent) if parent.will_wake(waker) => {}
                _ => cell.parent = Some(waker.clone()),
            }
        }
    }

    /// Forgets the parent of `id`; the awaiting side went away.
    pub(crate) fn detach(&self, id: TaskId) {
        if let Some(cell) = self.tasks.borrow_mut().get_mut(id) {
            cell.detached = true;
            if cell.parent.take().is_some() {
                tracing::trace!(task = ?id, "awaiting task dropped, child result will be discarded");
            }
        }
    }

    /// Records what the task being resumed is about to suspend on.
    pub(crate) fn note_awaiting(&self, awaiting: Awaiting) {
        if let Some(id) = self.current.get() {
            if let Some(cell) = self.tasks.borrow_mut().get_mut(id) {
                cell.state = TaskState::Suspended(awaiting);
            }
        }
    }

    pub(super) fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.borrow().get(id).map(|cell| cell.state)
    }

    pub(super) fn current(&self) -> Option<TaskId> {
        self.current.get()
    }

    /// Drops every task and closes the worker pool.
    ///
    /// Workers are joined first so no leaf can wake a task while the table is torn down.
    pub(super) fn shutdown(&self) {
        self.queue.stop();
        self.pool.shutdown();

        loop {
            let cells: Vec<_> = self.tasks.borrow_mut().drain().collect();
            if cells.is_empty() {
                break;
            }
            tracing::debug!(executor = self.id, tasks = cells.len(), "dropping unfinished tasks");
            for (id, _) in &cells {
                TaskDebugger::unregister(self.id, *id);
            }
            // bodies may hold handles and child tasks; drop them outside the borrow
            drop(cells);
        }
        while self.queue.pop().is_some() {}
    }
}

/// Cheap, clonable reference to an executor, passed to everything that needs to talk to it.
///
/// Handles are bound to the executor thread.
#[derive(Clone)]
pub struct Handle {
    core: Rc<Core>,
}

impl Handle {
    pub(super) fn new(core: Core) -> Self {
        Self {
            core: Rc::new(core),
        }
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    /// The handle of the executor being driven on this thread, if any.
    pub fn try_current() -> Option<Handle> {
        if CURRENT.is_set() {
            Some(CURRENT.with(|handle| handle.clone()))
        } else {
            None
        }
    }

    /// Registers `task` as a root task and queues it.
    ///
    /// The task does not run before the executor dequeues it.
    pub fn spawn<T: 'static>(&self, task: Task<T>) -> JoinHandle<T> {
        let (_, label, future) = task.into_parts();
        let (id, slot) = self.core.insert(future, label, true);
        self.core.schedule(id);

        tracing::debug!(executor = self.core.id, task = ?id, label = label.unwrap_or(""), "spawned root task");
        JoinHandle::new(id, slot)
    }

    /// A leaf that completes after `duration`, measured on a worker thread.
    pub fn delay(&self, duration: Duration) -> Delay {
        Leaf::new(self, Sleep::new(duration))
    }

    /// A leaf that runs `f` on a worker thread.
    pub fn offload<R, F>(&self, f: F) -> Offload<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        Leaf::new(self, Blocking::new(f))
    }

    pub fn stopper(&self) -> Stopper {
        Stopper {
            queue: self.core.queue.clone(),
        }
    }

    /// Lifecycle state of a live task. `None` once the task has been released.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.core.state(id)
    }

    /// The task currently being resumed by this executor.
    pub fn current_task(&self) -> Option<TaskId> {
        self.core.current()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("executor", &self.core.id)
            .field("tasks", &self.core.live_tasks())
            .finish()
    }
}

/// Asks a running executor to return from [`run`](super::LocalExecutor::run).
///
/// Can be sent to and used from any thread.
#[derive(Clone, Debug)]
pub struct Stopper {
    queue: Arc<ReadyQueue>,
}

impl Stopper {
    pub fn stop(&self) {
        self.queue.stop();
    }
}
