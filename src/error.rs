//! Error type shared by every fallible operation in the crate.
//!
//! Contention is never an error: a busy guard or a busy ordering lock is
//! waited on. Errors describe misuse (fetching a result too early, asking for
//! the wrong type, releasing twice), a bounded wait that ran out, or a worker
//! thread that could not be started or did not finish cleanly.

use std::time::Duration;

/// Errors reported by guards, pools and worker handles.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The worker has not finished, so its result is not visible yet.
    #[error("worker result is not ready: the worker has not finished or has not been joined/detached")]
    NotReady,

    /// The stored result has a different type than the one requested.
    #[error("worker result type mismatch: requested `{expected}`")]
    TypeMismatch {
        /// Name of the requested type.
        expected: &'static str,
    },

    /// The worker produced no value (unit body), or the value was already taken.
    #[error("worker produced no result")]
    NoResult,

    /// `try_release` was called on a guard that holds nothing.
    #[error("guard is not held; nothing to release")]
    AlreadyReleased,

    /// The protected value is already registered with a different pool.
    #[error("protected value is bound to resource pool {bound}, not pool {requested}")]
    ForeignPool {
        /// Id of the pool the value is bound to.
        bound: u64,
        /// Id of the pool that tried to branch it.
        requested: u64,
    },

    /// A bounded wait expired.
    #[error("gave up waiting after {waited:?}")]
    Timeout {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The wait was cancelled through a [`CancelToken`](crate::config::CancelToken).
    #[error("wait cancelled")]
    Cancelled,

    /// The OS refused to create the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker body panicked.
    #[error("worker `{name}` panicked")]
    WorkerPanicked {
        /// Thread name of the worker.
        name: String,
    },
}

impl Error {
    /// Returns `true` for errors caused by a bounded wait giving up.
    pub fn is_wait_abort(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Cancelled)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_problem() {
        let err = Error::TypeMismatch { expected: "u32" };
        assert!(err.to_string().contains("u32"));

        let err = Error::ForeignPool { bound: 1, requested: 2 };
        assert!(err.to_string().contains("pool 1"));
        assert!(err.to_string().contains("pool 2"));
    }

    #[test]
    fn wait_aborts_are_classified() {
        assert!(Error::Cancelled.is_wait_abort());
        assert!(Error::Timeout { waited: Duration::from_millis(1) }.is_wait_abort());
        assert!(!Error::NotReady.is_wait_abort());
    }
}
