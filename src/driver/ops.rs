//! Built-in leaf operations.
use std::{
    fmt,
    time::{Duration, Instant},
};

use super::{CancelSignal, Leaf, LeafOp};

/// Awaitable timer. Resolves to the time the worker actually slept.
pub type Delay = Leaf<Sleep>;

/// Awaitable closure running on the worker pool. Resolves to the closure's return value.
pub type Offload<R> = Leaf<Blocking<R>>;

/// Blocks a worker for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl LeafOp for Sleep {
    type Output = Duration;

    fn perform(self, cancel: &CancelSignal) -> Duration {
        let start = Instant::now();
        if !cancel.sleep(self.duration) {
            tracing::debug!(duration = ?self.duration, "sleep cut short by shutdown");
        }
        start.elapsed()
    }
}

/// Runs an arbitrary closure on a worker.
pub struct Blocking<R> {
    f: Box<dyn FnOnce() -> R + Send>,
}

impl<R> Blocking<R> {
    pub fn new(f: impl FnOnce() -> R + Send + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl<R> fmt::Debug for Blocking<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Blocking")
    }
}

impl<R: Send + 'static> LeafOp for Blocking<R> {
    type Output = R;

    fn perform(self, _: &CancelSignal) -> R {
        (self.f)()
    }
}
