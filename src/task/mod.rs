//! Tasks: lazily started, composable asynchronous computations.
//!
//! A [`Task`] wraps a future without polling it. It starts in one of two ways:
//!
//! 1. spawned as a root task ([`Handle::spawn`](crate::Handle::spawn)), which queues it on the
//!    executor; its result is observed through a [`JoinHandle`];
//! 2. awaited from another task's body, which resumes it right away, inline, up to its first
//!    suspension point. If it did not finish there, the awaiting task records itself as the
//!    child's parent and suspends. When the child completes, the executor queues the parent
//!    again; the parent is never resumed from inside the child's completion.
//!
//! A panic inside a task body does not unwind into the executor. It is caught at the resume
//! boundary and handed to whoever awaits the task as a [`TaskError`](crate::TaskError).
pub mod debugging;
mod join;
pub(crate) mod raw;
mod state;
mod task_impl;
pub(crate) mod waker_fn;

pub use join::JoinHandle;
pub use state::{Awaiting, TaskState};
pub use task_impl::{Awaited, Task};

slotmap::new_key_type! {
    /// Identity of a started task within its executor.
    ///
    /// Ids are generational: once a task is released its id is never handed out again by the
    /// same executor, so a stale id simply refers to nothing.
    pub struct TaskId;
}

/// Mark context for task operation
macro_rules! dbg_context {
    ($executor:expr, $id:expr, $name:tt, $($body:tt)*) => {{
        let entered = $crate::task::debugging::TaskDebugger::enter($executor, $id, $name);

        defer! {
            if entered {
                $crate::task::debugging::TaskDebugger::leave();
            }
        }

        $($body)*
    }};
}

pub(crate) use dbg_context;
