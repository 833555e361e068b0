use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

use crate::{
    error::{Error, Result},
    utils::{lock, thread_id::gen_id},
};

pub(crate) type Job = Box<dyn FnOnce(&CancelSignal) + Send>;

/// Raised when the worker pool shuts down.
///
/// Leaf operations that block should wait on it (see [`CancelSignal::sleep`]) so shutdown does
/// not have to wait for them.
pub struct CancelSignal {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }

    /// Sleeps for `duration` or until the signal is raised.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let cancelled = lock(&self.cancelled);
        let (cancelled, _) = self
            .cond
            .wait_timeout_while(cancelled, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !*cancelled
    }

    fn cancel(&self) {
        *lock(&self.cancelled) = true;
        self.cond.notify_all();
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct JobQueue {
    jobs: VecDeque<Job>,
    /// Workers blocked waiting for a job.
    idle: usize,
    closed: bool,
}

struct Shared {
    queue: Mutex<JobQueue>,
    available: Condvar,
    cancel: CancelSignal,
}

/// Supervised pool of background threads running leaf operations.
///
/// The pool owns every worker it starts and joins them all on [`shutdown`](Self::shutdown).
/// It starts with `min_workers` threads and grows, up to `max_workers`, whenever a job is
/// submitted while no worker is idle, so a blocking leaf never waits behind another one.
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    workers: RefCell<Vec<thread::JoinHandle<()>>>,
    max_workers: usize,
    thread_name: String,
}

impl WorkerPool {
    pub(crate) fn new(min_workers: usize, max_workers: usize, thread_name: String) -> Result<Self> {
        let pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(JobQueue {
                    jobs: VecDeque::new(),
                    idle: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                cancel: CancelSignal::new(),
            }),
            workers: RefCell::new(Vec::with_capacity(min_workers)),
            max_workers,
            thread_name,
        };

        for _ in 0..min_workers {
            pool.spawn_worker()?;
        }

        Ok(pool)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.borrow().len()
    }

    fn spawn_worker(&self) -> Result<()> {
        let id = gen_id();
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, id))
            .spawn(move || worker_loop(id, shared))
            .map_err(|source| Error::WorkerSpawnFailed { source })?;

        tracing::debug!(worker = id, "started worker thread");
        self.workers.borrow_mut().push(handle);
        Ok(())
    }

    /// Queues a job. It runs on a pool thread and must not touch the executor except through a
    /// waker.
    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        let grow = {
            let mut queue = lock(&self.shared.queue);
            if queue.closed {
                return Err(Error::PoolShutDown);
            }

            queue.jobs.push_back(job);
            queue.idle < queue.jobs.len()
        };
        self.shared.available.notify_one();

        if grow && self.num_workers() < self.max_workers {
            if let Err(err) = self.spawn_worker() {
                if self.num_workers() == 0 {
                    lock(&self.shared.queue).jobs.clear();
                    return Err(err);
                }
                tracing::warn!(
                    error = %err,
                    workers = self.num_workers(),
                    "could not grow the worker pool, job waits for a busy worker"
                );
            }
        }

        Ok(())
    }

    /// Closes the pool: raises the cancel signal, drops jobs that never started and joins every
    /// worker. Idempotent.
    pub(crate) fn shutdown(&self) {
        let discarded = {
            let mut queue = lock(&self.shared.queue);
            queue.closed = true;
            std::mem::take(&mut queue.jobs)
        };
        if !discarded.is_empty() {
            tracing::debug!(jobs = discarded.len(), "discarding jobs that never started");
        }
        drop(discarded);

        self.shared.cancel.cancel();
        self.shared.available.notify_all();

        let workers = std::mem::take(&mut *self.workers.borrow_mut());
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = lock(&shared.queue);
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break Some(job);
                }
                if queue.closed {
                    break None;
                }

                queue.idle += 1;
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                queue.idle -= 1;
            }
        };

        match job {
            Some(job) => job(&shared.cancel),
            None => break,
        }
    }

    tracing::debug!(worker = id, "worker thread exiting");
}
