//! Process-unique ids for threads, pools and workers.
//!
//! Ids start at 1 so that 0 can mean "nobody" inside atomics.

use std::sync::atomic::{AtomicU64, Ordering};

static THREAD_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static WORKER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = THREAD_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Id of the calling thread, used to attribute bulk holds.
#[inline]
pub(crate) fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

#[inline]
pub(crate) fn next_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identifies one worker handle for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        Self(WORKER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
