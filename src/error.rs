use std::{any::Any, io};

use crate::{task::TaskId, utils::panic_message};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The worker pool could not start a thread to run leaf operations.
    #[error("failed to start a background worker")]
    WorkerSpawnFailed {
        #[source]
        source: io::Error,
    },

    /// A leaf operation was submitted after the worker pool shut down.
    #[error("the worker pool has shut down")]
    PoolShutDown,

    /// A leaf operation panicked on its worker thread.
    #[error("leaf operation panicked: {message}")]
    LeafPanicked { message: String },

    /// An executor is already being driven on this thread.
    #[error("there is already a LocalExecutor running on this thread")]
    AlreadyRunning,

    /// A root task failed and the executor escalates root failures.
    #[error("root task failed: {0}")]
    RootTaskFailed(TaskError),

    /// A child task failed; lets task bodies use `?` on awaited tasks.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Failure of a single task, attributed to the task that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task {task:?}{} panicked: {message}", fmt_label(.label))]
    Panicked {
        task: TaskId,
        label: Option<&'static str>,
        message: String,
    },
}

impl TaskError {
    pub(crate) fn panicked(
        task: TaskId,
        label: Option<&'static str>,
        payload: Box<dyn Any + Send>,
    ) -> Self {
        let message = panic_message(payload);

        TaskError::Panicked {
            task,
            label,
            message,
        }
    }

    /// The task the failure originated in.
    pub fn task(&self) -> TaskId {
        match self {
            TaskError::Panicked { task, .. } => *task,
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            TaskError::Panicked { label, .. } => *label,
        }
    }
}

fn fmt_label(label: &Option<&'static str>) -> String {
    match label {
        Some(l) => format!(" ({})", l),
        None => String::new(),
    }
}
