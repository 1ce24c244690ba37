//! Configuration for waits, worker disposition and bulk management.
//!
//! Everything here except [`CancelToken`] is plain data: `Copy`/`Clone`,
//! `Default`, and serde (de)serializable so embedding code can keep it in
//! whatever config file it already loads.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a busy-wait burns time between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// Retry immediately with only a `spin_loop` hint.
    Spin,
    /// Exponential spinning that escalates to `yield_now` under contention.
    #[default]
    Snooze,
}

/// Wait policy used by guards, bulk acquisition and the tree hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinConfig {
    /// Backoff between attempts.
    pub backoff: BackoffMode,
    /// Give up after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl SpinConfig {
    /// Waits forever with the default backoff.
    pub const fn unbounded() -> Self {
        Self {
            backoff: BackoffMode::Snooze,
            timeout: None,
        }
    }

    /// Gives up after `timeout`.
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            backoff: BackoffMode::Snooze,
            timeout: Some(timeout),
        }
    }

    /// Replaces the backoff mode.
    pub const fn backoff(mut self, backoff: BackoffMode) -> Self {
        self.backoff = backoff;
        self
    }
}

/// What a worker handle does with its thread when it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Block until the worker finishes.
    #[default]
    Join,
    /// Let the worker run on; its result stays retrievable once it finishes.
    Detach,
}

/// Whether a worker bulk-acquires its pool before running its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Management {
    /// Acquire every registered value before the body runs, release after.
    AcquireAllOnStart,
    /// The body acquires what it needs through its own guards.
    #[default]
    Explicit,
}

/// Everything a worker builder can be configured with up front.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Join or detach on drop.
    pub disposition: Disposition,
    /// Bulk acquisition policy.
    pub management: Management,
    /// Wait policy for the tree hand-off.
    pub spin: SpinConfig,
    /// Thread name. Defaults to `lineage-worker-<id>`.
    pub name: Option<String>,
}

/// Cooperative cancellation for waits that would otherwise spin forever.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every wait observing this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_wait_forever_and_join() {
        let config = WorkerConfig::default();
        assert_eq!(config.disposition, Disposition::Join);
        assert_eq!(config.management, Management::Explicit);
        assert_eq!(config.spin, SpinConfig::unbounded());
        assert!(config.name.is_none());
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
