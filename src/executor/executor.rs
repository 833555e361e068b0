use std::fmt;

use crate::{
    error::{Error, Result, TaskError},
    task::{JoinHandle, Task, TaskId, TaskState},
    utils::thread_id::gen_id,
};

use super::{
    builder::Builder,
    core::{Core, Handle, Stopper, CURRENT},
    queue::ReadyQueue,
};
use crate::driver::pool::WorkerPool;

/// What happened during one call to [`LocalExecutor::run`] (or since the previous one, for
/// tasks resumed through [`LocalExecutor::tick`]).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Number of times a task was resumed, including inline kick-offs of awaited children.
    pub resumptions: usize,
    /// Tasks that ran to completion.
    pub completed: usize,
    /// Tasks whose body panicked.
    pub failed: usize,
    /// Failures of root tasks, in the order they happened.
    pub root_failures: Vec<TaskError>,
}

/// Single-threaded executor.
///
/// Task bodies only ever run on the thread that calls [`run`](Self::run) or
/// [`tick`](Self::tick). Leaf operations run on the executor's worker pool.
pub struct LocalExecutor {
    handle: Handle,
    exit_when_idle: bool,
}

impl LocalExecutor {
    /// Creates an executor with the default [`Builder`] configuration.
    pub fn new() -> Result<Self> {
        Builder::new().build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(super) fn with_config(config: Builder) -> Result<Self> {
        let id = gen_id();
        let pool = WorkerPool::new(
            config.worker_threads,
            config.max_workers,
            config.thread_name.clone(),
        )?;
        let queue = ReadyQueue::new_with_capacity(config.queue_capacity);
        let core = Core::new(id, queue, pool, config.root_error_policy);

        tracing::debug!(executor = id, config = ?config, "executor created");

        Ok(Self {
            handle: Handle::new(core),
            exit_when_idle: config.exit_when_idle,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Registers a root task; see [`Handle::spawn`].
    pub fn spawn<T: 'static>(&self, task: Task<T>) -> JoinHandle<T> {
        self.handle.spawn(task)
    }

    pub fn stopper(&self) -> Stopper {
        self.handle.stopper()
    }

    /// Number of tasks started and not yet released.
    pub fn live_tasks(&self) -> usize {
        self.handle.core().live_tasks()
    }

    /// Number of task ids waiting in the ready queue.
    pub fn ready_len(&self) -> usize {
        self.handle.core().queue.len()
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.handle.state(id)
    }

    /// Resumes at most one ready task. Returns whether an id was dequeued.
    ///
    /// Never blocks.
    pub fn tick(&mut self) -> Result<bool> {
        if CURRENT.is_set() {
            return Err(Error::AlreadyRunning);
        }

        let core = self.handle.core();
        let ran = CURRENT.set(&self.handle, || core.run_next());

        match core.take_escalated() {
            Some(err) => Err(Error::RootTaskFailed(err)),
            None => Ok(ran),
        }
    }

    /// Drives the executor on the calling thread.
    ///
    /// Returns when a [`Stopper`] asks it to or, unless disabled with
    /// [`Builder::exit_when_idle`], once every task has been released. Parks the thread while
    /// the ready queue is empty.
    pub fn run(&mut self) -> Result<RunReport> {
        if CURRENT.is_set() {
            return Err(Error::AlreadyRunning);
        }

        let core = self.handle.core();
        tracing::debug!(executor = core.id, tasks = core.live_tasks(), "executor running");

        let outcome = CURRENT.set(&self.handle, || {
            loop {
                // Consume ready tasks, bounded so a stop request is noticed
                let mut max_round = core.queue.len() * 2;
                while core.run_next() {
                    if let Some(err) = core.take_escalated() {
                        return Err(Error::RootTaskFailed(err));
                    }

                    if max_round == 0 {
                        // maybe there's a task that keeps waking itself
                        break;
                    } else {
                        max_round -= 1;
                    }
                }

                if core.queue.is_stopped() {
                    tracing::debug!(executor = core.id, "stop requested");
                    break;
                }

                if self.exit_when_idle && core.live_tasks() == 0 {
                    break;
                }

                core.queue.park(None);
            }

            Ok(())
        });

        // every call starts from a clean stop flag and fresh counters
        core.queue.reset_stop();
        let report = core.take_report();
        tracing::debug!(
            executor = core.id,
            resumptions = report.resumptions,
            completed = report.completed,
            failed = report.failed,
            "executor returned"
        );

        outcome?;
        Ok(report)
    }

    /// Drops every unfinished task and joins the worker pool. Also done on drop.
    pub fn shutdown(self) {
        drop(self)
    }
}

impl Drop for LocalExecutor {
    fn drop(&mut self) {
        self.handle.core().shutdown();
    }
}

impl fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("handle", &self.handle)
            .field("exit_when_idle", &self.exit_when_idle)
            .finish()
    }
}
