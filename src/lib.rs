//! A small cooperative task runtime.
//!
//! All task bodies run on one executor thread. A task suspends only when it awaits another
//! [`Task`] or a leaf operation ([`Leaf`]); leaf work runs on a supervised pool of background
//! workers which hand the suspended task back to the executor's ready queue when they are done.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cotask::{LocalExecutor, Task};
//!
//! let mut ex = LocalExecutor::new().unwrap();
//! let handle = ex.handle();
//!
//! let h = handle.clone();
//! let root = ex.spawn(Task::new(&handle, async move {
//!     let slept = h.delay(Duration::from_millis(10)).await?;
//!     Ok::<_, cotask::Error>(slept)
//! }));
//!
//! ex.run().unwrap();
//! assert!(root.is_finished());
//! ```

#[macro_use(defer)]
extern crate scopeguard;

pub mod driver;
mod error;
pub mod executor;
pub mod task;
mod utils;

pub use driver::{
    ops::{Delay, Offload},
    CancelSignal, Leaf, LeafOp,
};
pub use error::{Error, Result, TaskError};
pub use executor::{Builder, Handle, LocalExecutor, RootErrorPolicy, RunReport, Stopper};
pub use task::{Awaiting, JoinHandle, Task, TaskId, TaskState};
