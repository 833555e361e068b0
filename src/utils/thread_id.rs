use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

static ID_GEN: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(1));

/// Process-unique id, shared by executors and worker threads. Never 0.
pub(crate) fn gen_id() -> usize {
    ID_GEN.fetch_add(1, Ordering::AcqRel)
}
