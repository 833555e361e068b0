pub(crate) mod thread_id;

use std::{
    any::Any,
    sync::{Mutex, MutexGuard},
};

/// Locks `mutex`, recovering the guard if another thread panicked while holding it.
///
/// Every critical section in the runtime is a single push, pop or flag update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
