use crate::error::Result;

use super::{queue::ReadyQueue, LocalExecutor};

/// What happens to a failure no parent receives: that of a root task, or of a child whose
/// awaiting side was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootErrorPolicy {
    /// Log the failure, record it in the [`RunReport`](super::RunReport) and keep running.
    #[default]
    Log,
    /// Stop the run and return the failure as
    /// [`Error::RootTaskFailed`](crate::Error::RootTaskFailed).
    Escalate,
}

/// Builder for configuring and creating a [`LocalExecutor`].
///
/// ```rust,no_run
/// use cotask::{Builder, RootErrorPolicy};
///
/// let ex = Builder::new()
///     .worker_threads(4)
///     .root_error_policy(RootErrorPolicy::Escalate)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    pub(super) queue_capacity: usize,
    pub(super) worker_threads: usize,
    pub(super) max_workers: usize,
    pub(super) thread_name: String,
    pub(super) root_error_policy: RootErrorPolicy,
    pub(super) exit_when_idle: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            queue_capacity: ReadyQueue::DEFAULT_CAPACITY,
            worker_threads: 2,
            max_workers: 64,
            thread_name: "cotask-worker".to_owned(),
            root_error_policy: RootErrorPolicy::default(),
            exit_when_idle: true,
        }
    }

    /// Initial capacity of the ready queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Number of worker threads started with the executor.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self.max_workers = self.max_workers.max(n);
        self
    }

    /// Upper bound the worker pool may grow to while leaf operations are in flight.
    ///
    /// # Panics
    ///
    /// Panics if `n` is smaller than the configured `worker_threads`.
    pub fn max_workers(mut self, n: usize) -> Self {
        assert!(
            n >= self.worker_threads,
            "max_workers must be >= worker_threads"
        );

        self.max_workers = n;
        self
    }

    /// Prefix of worker thread names; each worker appends `-{id}`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn root_error_policy(mut self, policy: RootErrorPolicy) -> Self {
        self.root_error_policy = policy;
        self
    }

    /// Whether [`LocalExecutor::run`] returns once no task is left.
    ///
    /// When disabled the executor keeps waiting for work until it is stopped through a
    /// [`Stopper`](super::Stopper).
    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.exit_when_idle = exit;
        self
    }

    /// Starts the worker pool and creates the executor.
    pub fn build(self) -> Result<LocalExecutor> {
        LocalExecutor::with_config(self)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{Builder, RootErrorPolicy};

    #[test]
    fn defaults() {
        let b = Builder::default();
        assert_eq!(b.queue_capacity, 4096);
        assert_eq!(b.worker_threads, 2);
        assert_eq!(b.max_workers, 64);
        assert_eq!(b.root_error_policy, RootErrorPolicy::Log);
        assert!(b.exit_when_idle);
    }

    #[test]
    fn worker_threads_raise_max_workers() {
        let b = Builder::new().worker_threads(100);
        assert_eq!(b.max_workers, 100);
    }

    #[test]
    #[should_panic(expected = "worker_threads must be > 0")]
    fn zero_workers_rejected() {
        let _ = Builder::new().worker_threads(0);
    }

    #[test]
    #[should_panic(expected = "max_workers must be >= worker_threads")]
    fn max_below_min_rejected() {
        let _ = Builder::new().worker_threads(4).max_workers(2);
    }
}
