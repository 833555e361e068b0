//! The single-threaded executor.
//!
//! A [`LocalExecutor`] owns a ready queue of task ids and a table of started tasks. Driving it
//! pops ids off the queue in FIFO order and resumes each task up to its next suspension point.
//! Ids are pushed back by task wakers: when a child task finishes (queueing its parent) and when
//! a background worker completes a leaf operation. The queue is the only state shared with
//! other threads.
mod builder;
pub(crate) mod core;
#[allow(clippy::module_inception)]
mod executor;
pub(crate) mod queue;

pub use self::core::{Handle, Stopper};
pub use builder::{Builder, RootErrorPolicy};
pub use executor::{LocalExecutor, RunReport};
